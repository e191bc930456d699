// src/utils/candle.rs
use anyhow::{Context, Result as AnyhowResult};
use candle_core::{Device, Tensor};
use once_cell::sync::Lazy;

static CANDLE_DEVICE: Lazy<Device> = Lazy::new(|| {
    // new_metal(0) fails cleanly when candle-core was built without Metal.
    match Device::new_metal(0) {
        Ok(metal_device) if metal_device.is_metal() => {
            log::info!("Successfully initialized Candle Metal device (GPU).");
            metal_device
        }
        Ok(_) => {
            log::warn!("Device::new_metal(0) returned a non-Metal device. Using CPU.");
            Device::Cpu
        }
        Err(err) => {
            log::debug!(
                "Candle Metal device unavailable ({:?}). Using CPU device.",
                err
            );
            Device::Cpu
        }
    }
});

/// Cosine similarity of each candidate row against `reference`.
///
/// Callers must pass candidates of the same length as `reference`. A zero
/// norm on either side yields 0.0 instead of NaN, and results are clamped to
/// [-1, 1] to absorb f32 rounding.
pub fn cosine_similarities_candle(
    reference: &[f32],
    candidates: &[Vec<f32>],
) -> AnyhowResult<Vec<f64>> {
    let dim = reference.len();
    let n = candidates.len();
    if n == 0 {
        return Ok(Vec::new());
    }
    if dim == 0 {
        return Ok(vec![0.0; n]);
    }
    if let Some(bad) = candidates.iter().position(|c| c.len() != dim) {
        return Err(anyhow::anyhow!(
            "Candidate {} has length {}, expected {}",
            bad,
            candidates[bad].len(),
            dim
        ));
    }

    let flat: Vec<f32> = candidates.iter().flat_map(|c| c.iter().copied()).collect();
    let cand_tensor = Tensor::from_vec(flat, (n, dim), &CANDLE_DEVICE)
        .with_context(|| format!("Failed to create candidate tensor ({} x {})", n, dim))?;
    let ref_tensor = Tensor::from_slice(reference, (dim, 1), &CANDLE_DEVICE)
        .with_context(|| format!("Failed to create reference tensor with len {}", dim))?;

    let dots = cand_tensor
        .matmul(&ref_tensor)
        .context("Candidate x reference matmul failed")?
        .squeeze(1)
        .context("Squeezing dot products failed")?
        .to_vec1::<f32>()
        .context("Converting dot products to vec failed")?;

    let cand_norms = cand_tensor
        .sqr()
        .context("Squaring candidate tensor failed")?
        .sum(1)
        .context("Summing candidate rows failed")?
        .sqrt()
        .context("Sqrt for candidate magnitudes failed")?
        .to_vec1::<f32>()
        .context("Converting candidate magnitudes to vec failed")?;

    let ref_norm = ref_tensor
        .sqr()
        .context("Squaring reference tensor failed")?
        .sum_all()
        .context("Summing reference tensor failed")?
        .sqrt()
        .context("Sqrt for reference magnitude failed")?
        .to_scalar::<f32>()
        .context("Converting reference magnitude to scalar failed")? as f64;

    let similarities = dots
        .iter()
        .zip(cand_norms.iter())
        .map(|(&dot, &cand_norm)| {
            let cand_norm = cand_norm as f64;
            if ref_norm == 0.0 || cand_norm == 0.0 {
                return 0.0;
            }
            let similarity = dot as f64 / (ref_norm * cand_norm);
            if similarity.is_nan() || similarity.is_infinite() {
                log::warn!(
                    "Calculated similarity is NaN or Infinite. dot_product: {}, mag_ref: {}, mag_cand: {}",
                    dot, ref_norm, cand_norm
                );
                return 0.0;
            }
            similarity.clamp(-1.0, 1.0)
        })
        .collect();

    Ok(similarities)
}
