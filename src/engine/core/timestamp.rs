// Timestamp parsing and formatting (H:M:S.fff, hours/minutes/fraction optional)

/// Parse a timestamp like `90`, `1:30`, `0:01:30.5` or `12.125` into seconds.
///
/// A lone seconds field may exceed 59; once minutes are present, minutes and
/// seconds must stay below 60.
pub fn parse_timestamp(input: &str) -> Option<f64> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    let fields: Vec<&str> = input.split(':').collect();
    if fields.len() > 3 {
        return None;
    }

    let (whole_fields, last) = fields.split_at(fields.len() - 1);
    let seconds = parse_seconds_field(last[0])?;

    let mut total = 0.0;
    for field in whole_fields {
        if field.is_empty() || !field.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let value: u64 = field.parse().ok()?;
        total = total * 60.0 + value as f64;
    }

    if !whole_fields.is_empty() {
        // Minutes (when hours are present) and seconds are bounded
        if seconds >= 60.0 {
            return None;
        }
        if whole_fields.len() == 2 && whole_fields[1].parse::<u64>().ok()? >= 60 {
            return None;
        }
    }

    Some(total * 60.0 + seconds)
}

fn parse_seconds_field(field: &str) -> Option<f64> {
    let (whole, fraction) = match field.split_once('.') {
        Some((w, f)) => (w, Some(f)),
        None => (field, None),
    };
    if whole.is_empty() && fraction.is_none() {
        return None;
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let mut value = if whole.is_empty() {
        0.0
    } else {
        whole.parse::<u64>().ok()? as f64
    };
    if let Some(frac) = fraction {
        if frac.is_empty() || !frac.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        value += format!("0.{}", frac).parse::<f64>().ok()?;
    }
    Some(value)
}

/// Format seconds as `HH:MM:SS.mmm`, the form ffmpeg accepts for -ss/-t
pub fn format_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let hours = total_ms / 3_600_000;
    let mins = (total_ms / 60_000) % 60;
    let secs = (total_ms / 1000) % 60;
    let ms = total_ms % 1000;
    format!("{:02}:{:02}:{:02}.{:03}", hours, mins, secs, ms)
}
