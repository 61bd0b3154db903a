use crate::session::ResultStats;

const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

/// `1536` -> `"1.5 KB"`. Base 1024, at most two decimals.
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut exp = 0;
    while exp < UNITS.len() - 1 && bytes >= 1024_u64.pow(exp as u32 + 1) {
        exp += 1;
    }
    let value = bytes as f64 / 1024_f64.powi(exp as i32);
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[exp])
}

/// Size change as shown to the user: `-70%` when smaller, `+12%` when the
/// file grew.
pub fn size_change(reduction_percent: i64) -> String {
    if reduction_percent < 0 {
        format!("+{}%", -reduction_percent)
    } else {
        format!("-{}%", reduction_percent)
    }
}

/// One-line summary shown once a run completes.
pub fn summary(stats: &ResultStats) -> String {
    format!(
        "{} ({} pages) -> {}  {}",
        format_file_size(stats.original_size),
        stats.page_count,
        format_file_size(stats.compressed_size),
        size_change(stats.reduction_percent)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(512), "512 Bytes");
        assert_eq!(format_file_size(1024), "1 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(52_428_800), "50 MB");
        assert_eq!(format_file_size(1_000_000), "976.56 KB");
        assert_eq!(format_file_size(3 * 1024 * 1024 * 1024), "3 GB");
        assert_eq!(format_file_size(5 * 1024_u64.pow(4)), "5120 GB");
    }

    #[test]
    fn summary_line() {
        let stats = ResultStats {
            original_size: 1_048_576,
            compressed_size: 314_573,
            page_count: 4,
            reduction_percent: 70,
        };
        assert_eq!(summary(&stats), "1 MB (4 pages) -> 307.2 KB  -70%");
    }

    #[test]
    fn grown_file_shows_plus() {
        let stats = ResultStats {
            original_size: 100,
            compressed_size: 112,
            page_count: 1,
            reduction_percent: -12,
        };
        assert_eq!(summary(&stats), "100 Bytes (1 pages) -> 112 Bytes  +12%");
        assert_eq!(size_change(0), "-0%");
    }
}
