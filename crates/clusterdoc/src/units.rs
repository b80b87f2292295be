//! Byte humanization, base-1024 units.

const KB: f64 = 1024.0;
const MB: f64 = KB * 1024.0;
const GB: f64 = MB * 1024.0;
const TB: f64 = GB * 1024.0;
const PB: f64 = TB * 1024.0;

pub fn humanize_bytes(num_bytes: i64) -> String {
    humanize_bytes_f(num_bytes as f64)
}

pub fn humanize_bytes_f(num_bytes: f64) -> String {
    if num_bytes < KB {
        format!("{}b", num_bytes as i64)
    } else if num_bytes < MB {
        format!("{:.1}kb", num_bytes / KB)
    } else if num_bytes < GB {
        format!("{:.1}mb", num_bytes / MB)
    } else if num_bytes < TB {
        format!("{:.1}gb", num_bytes / GB)
    } else if num_bytes < PB {
        format!("{:.1}tb", num_bytes / TB)
    } else {
        format!("{:.1}pb", num_bytes / PB)
    }
}
