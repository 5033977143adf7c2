use std::time::Instant;

use anyhow::Result;
use ndarray::Array2;
use rand_distr::{Distribution, StandardNormal};

use ricepack::{compress_image, decompress_image, QuantizeRiceCompressOption};

fn main() -> Result<()> {
    // Synthetic sky frame: slow gradient plus Gaussian background noise.
    let mut rng = rand::rng();
    let (height, width) = (4096, 4096);
    let data: Array2<f32> = Array2::from_shape_fn((height, width), |(r, c)| {
        let noise: f64 = StandardNormal.sample(&mut rng);
        (1000.0 + 0.002 * r as f64 + 0.001 * c as f64 + noise * 2.5) as f32
    });

    let mut options = QuantizeRiceCompressOption::new();
    options.set_tile_height(64)?.set_tile_width(64)?;
    options.set_quantize_level(0.0)?; // auto scale from the noise estimate
    options.set_dither_seed(1885);

    let start = Instant::now();
    let compressed = compress_image(data.view(), &options)?;
    let encode_time = start.elapsed();

    let raw_bytes = height * width * std::mem::size_of::<f32>();
    println!(
        "compressed {raw_bytes} -> {} bytes (ratio {:.2}) in {encode_time:?}",
        compressed.len(),
        raw_bytes as f64 / compressed.len() as f64
    );

    let start = Instant::now();
    let recovered = decompress_image(&compressed, (height, width), &options)?;
    println!("decompressed in {:?}", start.elapsed());

    let max_err = data
        .iter()
        .zip(recovered.iter())
        .map(|(&a, &b)| (a - b).abs())
        .fold(0.0f32, f32::max);
    println!("max reconstruction error {max_err}");

    Ok(())
}
