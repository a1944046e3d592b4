use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};

pub const DEADLINE_FORMAT: &str = "%Y-%m-%dT00:00:00Z";

/// Exact string comparison. `14.4` and `14.4.0` count as different versions.
pub fn needs_update(enforced_version: &str, latest_version: &str) -> bool {
    enforced_version != latest_version
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineOffset {
    Standard,
    ActivelyExploited,
}

impl DeadlineOffset {
    pub fn for_release(has_active_exploit: bool) -> Self {
        if has_active_exploit {
            Self::ActivelyExploited
        } else {
            Self::Standard
        }
    }

    pub fn duration(self) -> Duration {
        match self {
            Self::Standard => Duration::weeks(2),
            Self::ActivelyExploited => Duration::weeks(1),
        }
    }
}

/// `now` plus the offset, truncated to midnight UTC of that day.
pub fn compute_deadline(now: DateTime<Utc>, has_active_exploit: bool) -> DateTime<Utc> {
    let target = now + DeadlineOffset::for_release(has_active_exploit).duration();
    target.date_naive().and_time(NaiveTime::MIN).and_utc()
}

pub fn format_deadline(deadline: DateTime<Utc>) -> String {
    deadline.format(DEADLINE_FORMAT).to_string()
}

pub fn ordinal(n: u32) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{}{}", n, suffix)
}

/// `Monday, March 3rd, 2025`
pub fn long_date(date: NaiveDate) -> String {
    format!(
        "{}, {} {}, {}",
        date.format("%A"),
        date.format("%B"),
        ordinal(date.day()),
        date.year()
    )
}

pub fn render_notice(template: &str, deadline: DateTime<Utc>) -> Result<String> {
    fill_placeholder(template, &long_date(deadline.date_naive()))
}

/// Substitutes `value` into the single `{}` (or `{0}`) field of `template`.
/// `{{` and `}}` are literal braces.
fn fill_placeholder(template: &str, value: &str) -> Result<String> {
    let mut out = String::with_capacity(template.len() + value.len());
    let mut fields = 0usize;
    let mut chars = template.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        match ch {
            '{' => {
                if matches!(chars.peek(), Some((_, '{'))) {
                    chars.next();
                    out.push('{');
                    continue;
                }
                let rest = &template[idx + 1..];
                let close = rest.find('}').ok_or_else(|| {
                    anyhow!("unclosed '{{' at byte {} in notice template", idx)
                })?;
                let name = &rest[..close];
                if !(name.is_empty() || name == "0") {
                    bail!(
                        "unsupported placeholder '{{{}}}' in notice template, expected '{{}}'",
                        name
                    );
                }
                for _ in 0..=name.chars().count() {
                    chars.next();
                }
                fields += 1;
                out.push_str(value);
            }
            '}' => {
                if matches!(chars.peek(), Some((_, '}'))) {
                    chars.next();
                    out.push('}');
                    continue;
                }
                bail!("unmatched '}}' at byte {} in notice template", idx);
            }
            _ => out.push(ch),
        }
    }

    match fields {
        1 => Ok(out),
        0 => bail!("notice template has no '{{}}' placeholder"),
        n => bail!(
            "notice template has {} placeholders, expected exactly one",
            n
        ),
    }
}
