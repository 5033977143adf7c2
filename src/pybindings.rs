use numpy::{PyArray2, PyReadonlyArray2, ToPyArray};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::{PyBytes, PyModule};

use crate::codec::{compress_image, decompress_image, QuantizeRiceCompressOption};
use crate::error::Error;

/// ---------- Python bindings for the whole-image codec ------------

fn to_py_err(err: Error) -> PyErr {
    PyValueError::new_err(err.to_string())
}

#[allow(clippy::too_many_arguments)]
fn build_options(
    tile_height: usize,
    tile_width: usize,
    block_size: usize,
    byte_pix: usize,
    quantize_level: f64,
    dither_seed: i64,
    check_null: bool,
) -> PyResult<QuantizeRiceCompressOption> {
    let mut options = QuantizeRiceCompressOption::new();
    options.set_tile_height(tile_height).map_err(to_py_err)?;
    options.set_tile_width(tile_width).map_err(to_py_err)?;
    options.set_block_size(block_size).map_err(to_py_err)?;
    options.set_byte_pix(byte_pix).map_err(to_py_err)?;
    options.set_quantize_level(quantize_level).map_err(to_py_err)?;
    options.set_dither_seed(dither_seed);
    options.set_check_null(check_null);
    Ok(options)
}

#[pymodule]
fn ricepack<'py>(_py: Python<'py>, m: &Bound<'py, PyModule>) -> PyResult<()> {
    #[pyfn(m)]
    #[pyo3(name = "compress")]
    #[allow(clippy::too_many_arguments)]
    fn compress<'py>(
        py: Python<'py>,
        data: PyReadonlyArray2<'py, f32>,
        tile_height: usize,
        tile_width: usize,
        block_size: usize,
        byte_pix: usize,
        quantize_level: f64,
        dither_seed: i64,
        check_null: bool,
    ) -> PyResult<Bound<'py, PyBytes>> {
        let options = build_options(
            tile_height,
            tile_width,
            block_size,
            byte_pix,
            quantize_level,
            dither_seed,
            check_null,
        )?;
        let local = data.as_array().to_owned();
        let stream = compress_image(local.view(), &options).map_err(to_py_err)?;
        Ok(PyBytes::new(py, &stream))
    }

    #[pyfn(m)]
    #[pyo3(name = "decompress")]
    #[allow(clippy::too_many_arguments)]
    fn decompress<'py>(
        py: Python<'py>,
        stream: &[u8],
        height: usize,
        width: usize,
        tile_height: usize,
        tile_width: usize,
        block_size: usize,
        byte_pix: usize,
        quantize_level: f64,
        dither_seed: i64,
        check_null: bool,
    ) -> PyResult<Bound<'py, PyArray2<f32>>> {
        let options = build_options(
            tile_height,
            tile_width,
            block_size,
            byte_pix,
            quantize_level,
            dither_seed,
            check_null,
        )?;
        let image = decompress_image(stream, (height, width), &options).map_err(to_py_err)?;
        Ok(image.to_pyarray(py))
    }

    Ok(())
}
