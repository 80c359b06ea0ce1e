use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

static TRY_AGAIN_IN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)try again in\s+(\d+(?:\.\d+)?)\s*(ms|s)\b").expect("Valid regex pattern")
});

/// How long to wait before retrying a rate-limited request.
///
/// A numeric `Retry-After` header wins, then a "try again in 1.5s" / "try again in
/// 300ms" hint in the error detail, else `fallback`.
pub fn extract_retry_delay(
    detail: &str,
    retry_after_header: Option<&str>,
    fallback: Duration,
) -> Duration {
    if let Some(seconds) = retry_after_header
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
    {
        return Duration::from_secs_f64(seconds);
    }

    TRY_AGAIN_IN
        .captures(detail)
        .and_then(|captures| {
            let amount: f64 = captures.get(1)?.as_str().parse().ok()?;
            let unit = captures.get(2)?.as_str().to_lowercase();
            let seconds = if unit == "ms" { amount / 1000.0 } else { amount };
            Some(Duration::from_secs_f64(seconds))
        })
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FALLBACK: Duration = Duration::from_secs(2);

    #[test]
    fn test_header_wins() {
        assert_eq!(
            extract_retry_delay("Please try again in 9s", Some("3"), FALLBACK),
            Duration::from_secs(3)
        );
    }

    #[test]
    fn test_detail_hint() {
        assert_eq!(
            extract_retry_delay("Rate limit reached. Please try again in 1.5s.", None, FALLBACK),
            Duration::from_millis(1500)
        );
        assert_eq!(
            extract_retry_delay("Try again in 250ms", Some("soon"), FALLBACK),
            Duration::from_millis(250)
        );
    }

    #[test]
    fn test_fallback() {
        assert_eq!(extract_retry_delay("rate limited", None, FALLBACK), FALLBACK);
        assert_eq!(extract_retry_delay("", Some("-1"), FALLBACK), FALLBACK);
    }
}
