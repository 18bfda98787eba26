// Population mean and std in one pass (Welford). Empty input gives (0, 0).
pub fn mean_std<I>(values: I) -> (f64, f64)
where
    I: IntoIterator<Item = f64>,
{
    let mut count = 0u64;
    let mut mean = 0.0;
    let mut m2 = 0.0;

    for value in values {
        count += 1;
        let delta = value - mean;
        mean += delta / count as f64;
        m2 += delta * (value - mean);
    }

    if count == 0 {
        return (0.0, 0.0);
    }
    (mean, (m2 / count as f64).max(0.0).sqrt())
}

// Format a duration in milliseconds for display
pub fn format_ms(ms: f64) -> String {
    if ms >= 1000.0 {
        format!("{:.2} s", ms / 1000.0)
    } else if ms >= 10.0 {
        format!("{:.1} ms", ms)
    } else if ms >= 0.1 {
        format!("{:.2} ms", ms)
    } else {
        format!("{:.0} µs", ms * 1000.0)
    }
}

pub fn format_percent(percent: f64) -> String {
    format!("{:.1}%", percent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_std_of_empty_is_zero() {
        assert_eq!(mean_std(std::iter::empty()), (0.0, 0.0));
    }

    #[test]
    fn mean_std_population() {
        let (mean, std) = mean_std([2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((mean - 5.0).abs() < 1e-12);
        assert!((std - 2.0).abs() < 1e-12);
    }

    #[test]
    fn mean_std_constant_has_no_spread() {
        let (mean, std) = mean_std(std::iter::repeat(3.5).take(100));
        assert!((mean - 3.5).abs() < 1e-12);
        assert_eq!(std, 0.0);
    }

    #[test]
    fn format_ms_picks_unit() {
        assert_eq!(format_ms(0.05), "50 µs");
        assert_eq!(format_ms(3.456), "3.46 ms");
        assert_eq!(format_ms(16.04), "16.0 ms");
        assert_eq!(format_ms(1500.0), "1.50 s");
        assert_eq!(format_percent(12.345), "12.3%");
    }
}
