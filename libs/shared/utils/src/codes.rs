/// Next human-readable code in a `PREFIXnnn` sequence.
///
/// `latest` is the most recently issued code. When it is missing or does not
/// carry the prefix followed by digits, numbering restarts from `fallback + 1`.
pub fn next_sequential_code(prefix: &str, width: usize, latest: Option<&str>, fallback: u64) -> String {
    let next = latest
        .and_then(|code| code.strip_prefix(prefix))
        .and_then(|digits| digits.parse::<u64>().ok())
        .map(|n| n + 1)
        .unwrap_or(fallback + 1);

    format!("{}{:0width$}", prefix, next, width = width)
}
