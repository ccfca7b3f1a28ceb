use rand::Rng;

const SUFFIX_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const SUFFIX_LEN: usize = 9;

/// Resolve the correlation identifier for a request. A caller-supplied
/// non-empty id is returned byte-for-byte, whatever it contains; anything
/// else gets a freshly generated one.
pub fn ensure_correlation_id(supplied: Option<&str>) -> String {
    match supplied {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => generate_correlation_id(),
    }
}

/// Generate `gateway-<unixMillis>-<9 lowercase alphanumeric>`. The millisecond
/// component keeps concurrent generation collision-free in practice without
/// leaning on the random suffix alone.
pub fn generate_correlation_id() -> String {
    let millis = time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| SUFFIX_CHARSET[rng.gen_range(0..SUFFIX_CHARSET.len())] as char)
        .collect();

    format!("gateway-{millis}-{suffix}")
}
