use regex::Regex;
use std::sync::OnceLock;

static USER_RE: OnceLock<Regex> = OnceLock::new();
static TWEET_RE: OnceLock<Regex> = OnceLock::new();

fn user_re() -> &'static Regex {
    USER_RE.get_or_init(|| {
        Regex::new(
            r"^(?:https?://(?:(?:www|mobile)\.)?(?:twitter|x)\.com/)?@?([A-Za-z0-9_]{1,15})/?(?:[?#].*)?$",
        )
        .unwrap()
    })
}

fn tweet_re() -> &'static Regex {
    TWEET_RE.get_or_init(|| {
        Regex::new(
            r"^(?:https?://(?:(?:www|mobile)\.)?(?:twitter|x)\.com/(?:[A-Za-z0-9_]{1,15}|i/web)/status(?:es)?/)?([0-9]+)(?:[/?#].*)?$",
        )
        .unwrap()
    })
}

/// Screen name from `name`, `@name` or a profile URL.
pub fn parse_user(input: &str) -> anyhow::Result<String> {
    user_re()
        .captures(input.trim())
        .map(|c| c[1].to_string())
        .ok_or_else(|| anyhow::anyhow!("not a user name or profile URL: '{input}'"))
}

/// Tweet id from a bare id or a status URL.
pub fn parse_tweet(input: &str) -> anyhow::Result<String> {
    tweet_re()
        .captures(input.trim())
        .map(|c| c[1].to_string())
        .ok_or_else(|| anyhow::anyhow!("not a tweet id or status URL: '{input}'"))
}
