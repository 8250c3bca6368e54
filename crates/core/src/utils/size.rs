const PREFIXES: [&str; 9] = ["", "K", "M", "G", "T", "P", "E", "Z", "Y"];

/// Format a number with SI (or binary, with `binary` set) prefixes.
///
/// Values below the first prefix are printed as they are (`999B`); larger
/// values get one decimal (`1.5KB`, `1.0KiB`). Prefixes stop at `Y`.
pub fn size_fmt(size: f64, binary: bool, unit: &str) -> String {
    if size == 0.0 {
        return format!("0{unit}");
    }

    let exponent = if binary {
        (size.abs().log2() / 10.0).floor() as i32
    } else {
        (size.abs().log10() / 3.0).floor() as i32
    };

    if exponent <= 0 {
        return format!("{size}{unit}");
    }

    let mantissa = if binary {
        2f64.powi(10 * exponent)
    } else {
        10f64.powi(3 * exponent)
    };
    let prefix = PREFIXES.get(exponent as usize).unwrap_or(&PREFIXES[PREFIXES.len() - 1]);
    let binary_marker = if binary { "i" } else { "" };

    format!("{:.1}{prefix}{binary_marker}{unit}", size / mantissa)
}
