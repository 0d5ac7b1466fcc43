use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::ConfigError;

/// Split entries into (train, validation) with a seeded shuffle.
///
/// Both halves keep their input order. With at least two entries,
/// neither half is empty.
pub fn split_dataset<T>(
    entries: Vec<T>,
    validation_ratio: f64,
    seed: u64,
) -> Result<(Vec<T>, Vec<T>), ConfigError> {
    if !(validation_ratio > 0.0 && validation_ratio < 1.0) {
        return Err(ConfigError::Invalid(vec![format!(
            "validation ratio must be between 0 and 1, got {}",
            validation_ratio
        )]));
    }

    let total = entries.len();
    let validation_len = if total < 2 {
        0
    } else {
        ((total as f64 * validation_ratio).round() as usize).clamp(1, total - 1)
    };

    let mut indices: Vec<usize> = (0..total).collect();
    indices.shuffle(&mut StdRng::seed_from_u64(seed));
    let mut in_validation = vec![false; total];
    for &i in indices.iter().take(validation_len) {
        in_validation[i] = true;
    }

    let mut train = Vec::with_capacity(total - validation_len);
    let mut validation = Vec::with_capacity(validation_len);
    for (i, entry) in entries.into_iter().enumerate() {
        if in_validation[i] {
            validation.push(entry);
        } else {
            train.push(entry);
        }
    }

    Ok((train, validation))
}
