use log::warn;

use super::stats::nan_median;

/// Consistency factor turning a MAD into a normal-distribution sigma.
pub const MAD_SCALE: f64 = 1.482;

/// Replace outliers in `data` with NaN.
///
/// A value `x` is an outlier when `|x - med| / (1.482 * median(|x - med|)) > thresh`,
/// medians taken over the finite values. Values exactly at the threshold are kept.
/// A zero MAD flags nothing. The input is left untouched.
pub fn clean_outliers(data: &[f64], thresh: f64) -> Vec<f64> {
    let mut cleaned = data.to_vec();

    let Some(med) = nan_median(data) else {
        return cleaned;
    };
    let deviations: Vec<f64> = data.iter().map(|x| (x - med).abs()).collect();
    let Some(mad) = nan_median(&deviations).map(|m| MAD_SCALE * m) else {
        return cleaned;
    };

    if mad == 0.0 {
        warn!("clean_outliers: MAD is equal to zero, no points flagged");
        return cleaned;
    }

    for x in cleaned.iter_mut() {
        if ((*x - med) / mad).abs() > thresh {
            *x = f64::NAN;
        }
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_single_spike() {
        let flux = [10.0, 12.0, 11.0, 100.0, 9.0];
        let cleaned = clean_outliers(&flux, 2.0);
        assert!(cleaned[3].is_nan());
        assert_eq!(cleaned[0], 10.0);
        assert_eq!(cleaned[1], 12.0);
        assert_eq!(cleaned[2], 11.0);
        assert_eq!(cleaned[4], 9.0);
        // input untouched
        assert_eq!(flux[3], 100.0);
    }

    #[test]
    fn test_zero_mad_flags_nothing() {
        let flux = [5.0, 5.0, 5.0, 5.0, 50.0];
        let cleaned = clean_outliers(&flux, 3.0);
        assert_eq!(cleaned, flux.to_vec());
    }

    #[test]
    fn test_nan_positions_satisfy_threshold_test() {
        let flux = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 30.0, -20.0, 3.5, f64::NAN];
        let thresh = 2.5;
        let cleaned = clean_outliers(&flux, thresh);

        let med = nan_median(&flux).unwrap();
        let devs: Vec<f64> = flux.iter().map(|x| (x - med).abs()).collect();
        let mad = MAD_SCALE * nan_median(&devs).unwrap();
        for (orig, out) in flux.iter().zip(&cleaned) {
            if orig.is_nan() {
                assert!(out.is_nan());
                continue;
            }
            let flagged = ((orig - med) / mad).abs() > thresh;
            assert_eq!(out.is_nan(), flagged, "value {orig}");
        }
    }

    #[test]
    fn test_value_at_threshold_is_kept() {
        // med = 0 and median(|x|) = 1, so the scaled deviation of `edge` is exactly 2
        let edge = MAD_SCALE * 2.0;
        let flux = [-1.0, 0.0, 1.0, edge, 0.0];
        let cleaned = clean_outliers(&flux, 2.0);
        assert!(cleaned.iter().all(|x| x.is_finite()));
    }
}
