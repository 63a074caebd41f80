/// Hex-encode a byte slice for log lines. Truncates long keys/values so a
/// single bad record doesn't flood the log.
pub fn hex(data: &[u8]) -> String {
	const MAX: usize = 32;
	if data.len() > MAX {
		format!("{}..({} bytes)", hex::encode(&data[..MAX]), data.len())
	} else {
		hex::encode(data)
	}
}
