//! Content-addressed id helpers. `id = prefix + hex(md5(text))` everywhere,
//! so two callers hashing the same stripped text always land on the same id
//! (spec I1/I2, P1/P2).

/// Compute a content-addressed id for `text` under `prefix`.
pub fn compute_mdhash_id(text: &str, prefix: &str) -> String {
    let digest = md5::compute(text.as_bytes());
    format!("{prefix}{:x}", digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_text_same_id() {
        let a = compute_mdhash_id("hello world", "chunk-");
        let b = compute_mdhash_id("hello world", "chunk-");
        assert_eq!(a, b);
        assert!(a.starts_with("chunk-"));
    }

    #[test]
    fn different_text_different_id() {
        let a = compute_mdhash_id("hello", "ent-");
        let b = compute_mdhash_id("world", "ent-");
        assert_ne!(a, b);
    }
}
