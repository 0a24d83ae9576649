/// Rough token estimate shared by every context layer: `chars / divisor`,
/// matching the spec's `chars/4` default.
pub fn estimate_tokens(text: &str, divisor: usize) -> usize {
    let divisor = divisor.max(1);
    (text.chars().count() + divisor - 1) / divisor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_rounds_up() {
        assert_eq!(estimate_tokens("abcd", 4), 1);
        assert_eq!(estimate_tokens("abcde", 4), 2);
        assert_eq!(estimate_tokens("", 4), 0);
    }
}
