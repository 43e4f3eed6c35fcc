use url::Url;

/// Format an offset in seconds as `HH:MM:SS`
pub fn format_timestamp(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, secs)
}

/// Format duration in human-readable format
pub fn format_duration(seconds: f64) -> String {
    let total_seconds = seconds as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Sanitize filename for safe filesystem usage
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| {
            match c {
                // Keep alphanumeric characters, spaces, hyphens, underscores, and dots
                c if c.is_alphanumeric() || c == ' ' || c == '-' || c == '_' || c == '.' => c,
                // Replace everything else with underscore
                _ => '_',
            }
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Generate a unique filename with timestamp
pub fn generate_unique_filename(base_name: &str, extension: &str) -> String {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let random_suffix = uuid::Uuid::new_v4().to_string()[..8].to_string();

    format!(
        "{}_{}_{}_{}.{}",
        "lianwen",
        sanitize_filename(base_name),
        timestamp,
        random_suffix,
        extension
    )
}

/// Extract domain from URL for display purposes
pub fn extract_domain(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .host_str()
        .map(|host| host.strip_prefix("www.").unwrap_or(host).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "00:00:00");
        assert_eq!(format_timestamp(75), "00:01:15");
        assert_eq!(format_timestamp(3725), "01:02:05");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30.0), "30s");
        assert_eq!(format_duration(90.0), "1m 30s");
        assert_eq!(format_duration(3661.0), "1h 1m 1s");
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("Hello World!"), "Hello World_");
        assert_eq!(sanitize_filename("test/file?name"), "test_file_name");
        assert_eq!(sanitize_filename("  spaced  "), "spaced");
        assert_eq!(sanitize_filename("视频标题 1"), "视频标题 1");
    }

    #[test]
    fn test_generate_unique_filename() {
        let a = generate_unique_filename("Video title 1", "txt");
        let b = generate_unique_filename("Video title 1", "txt");
        assert!(a.starts_with("lianwen_Video title 1_"));
        assert!(a.ends_with(".txt"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_extract_domain() {
        assert_eq!(extract_domain("https://www.youtube.com/watch?v=123"), Some("youtube.com".to_string()));
        assert_eq!(extract_domain("https://v.douyin.com/abc123/"), Some("v.douyin.com".to_string()));
        assert_eq!(extract_domain("invalid-url"), None);
    }
}
