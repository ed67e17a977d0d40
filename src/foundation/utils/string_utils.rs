use regex::Regex;
use std::sync::OnceLock;

/// Renders a wait time in Portuguese for user-facing messages.
///
/// Below one minute the wait is reported in seconds; from 60 seconds up it is
/// rounded up to whole minutes.
///
/// # Examples
///
/// ```
/// use musicatalog::foundation::utils::format_wait;
///
/// assert_eq!(format_wait(30), "30 segundos");
/// assert_eq!(format_wait(60), "1 minuto");
/// ```
pub fn format_wait(seconds: u64) -> String {
    match seconds {
        1 => "1 segundo".to_string(),
        s if s < 60 => format!("{s} segundos"),
        s => match s.div_ceil(60) {
            1 => "1 minuto".to_string(),
            m => format!("{m} minutos"),
        },
    }
}

/// Extracts the wait hint out of a rate-limit message such as
/// `"Rate limit exceeded. Try again in 12 seconds."`.
pub fn parse_retry_hint(message: &str) -> Option<u64> {
    static RETRY_HINT: OnceLock<Regex> = OnceLock::new();
    let re = RETRY_HINT.get_or_init(|| Regex::new(r"(?i)try again in (\d+) seconds?").unwrap());

    re.captures(message)
        .and_then(|cap| cap.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok())
}

/// Guesses the MIME type of an image from its file name.
///
/// Returns `None` for anything that is not a supported cover image.
pub fn image_mime_type(file_name: &str) -> Option<&'static str> {
    let extension = file_name.rsplit_once('.')?.1.to_lowercase();
    match extension.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}
