//! Console line numbers for the terminal servers behind a `c0` device.

/// Maps a console server SKU and its port to the patch panel line number.
///
/// Supported families are Cisco 4351, 3945 and 2921. Anything else, including blank inputs and
/// ports with non-numeric segments, yields `None`.
pub fn derive_line_for_c0(sku: &str, port: &str) -> Option<u32> {
	let sku = sku.trim().to_ascii_lowercase();
	let port = port.trim();

	if sku.is_empty() || port.is_empty() {
		return None;
	}

	let segments = port
		.split('/')
		.map(|segment| segment.trim().parse::<u32>().ok())
		.collect::<Option<Vec<_>>>()?;

	if sku.contains("4351") {
		return match segments.as_slice() {
			[0, 1, n] if *n <= 23 => Some(2 + n),
			[0, 2, n] if *n <= 23 => Some(26 + n),
			[0, 3, n] if *n <= 23 => Some(50 + n),
			[1, 0, n] if *n <= 23 => Some(98 + n),
			[2, 0, n] if *n <= 23 => Some(194 + n),
			_ => None,
		};
	}
	if sku.contains("3945") {
		return match segments.as_slice() {
			[1, n] if *n <= 31 => Some(67 + n),
			[2, n] if *n <= 31 => Some(131 + n),
			[3, n] if *n <= 31 => Some(195 + n),
			[4, n] if *n <= 31 => Some(259 + n),
			_ => None,
		};
	}
	if sku.contains("2921") {
		return match segments.as_slice() {
			[0, 0, n] if *n <= 15 => Some(3 + n),
			[0, 1, n] if *n <= 15 => Some(19 + n),
			[0, 2, n] if *n <= 15 => Some(35 + n),
			[0, 3, n] if *n <= 15 => Some(51 + n),
			[1, n] if *n <= 31 => Some(67 + n),
			_ => None,
		};
	}

	None
}
