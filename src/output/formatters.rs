use crate::cli::OutputFormat;
use crate::utils::format_timestamp;

/// Transcript segment: offset in seconds and spoken text
pub type Segment = (u64, &'static str);

/// Canned transcript every simulated extraction resolves to
const SAMPLE_SEGMENTS: &[Segment] = &[
    (0, "Hello everyone, today I want to share how to learn front-end development efficiently."),
    (15, "Front-end development is a fun and challenging field that takes constant learning and practice."),
    (80, "First, we need to master the basics: HTML, CSS and JavaScript."),
    (150, "Then, learn a mainstream framework such as React, Vue or Angular."),
    (225, "Most importantly, build projects and consolidate what you learn through practice."),
    (310, "Learning front-end development takes patience and persistence. I hope this helps."),
];

/// Render the transcript of one result in the chosen format
pub fn render_transcript(title: &str, format: OutputFormat) -> String {
    match format {
        OutputFormat::Markdown => format_as_markdown(title, SAMPLE_SEGMENTS),
        OutputFormat::Timestamp => format_as_timestamped(SAMPLE_SEGMENTS),
        OutputFormat::Plain => format_as_plain(SAMPLE_SEGMENTS),
    }
}

pub fn format_as_markdown(title: &str, segments: &[Segment]) -> String {
    let mut output = format!("# {}\n\n", title);

    if let Some(((_, intro), rest)) = segments.split_first() {
        output.push_str("## Introduction\n");
        output.push_str(intro);
        output.push_str("\n\n");

        if let Some(((_, closing), body)) = rest.split_last() {
            if !body.is_empty() {
                output.push_str("## Key Points\n");
                for (i, (_, text)) in body.iter().enumerate() {
                    output.push_str(&format!("{}. {}\n", i + 1, text));
                }
                output.push('\n');
            }
            output.push_str("## Summary\n");
            output.push_str(closing);
            output.push('\n');
        }
    }

    output
}

pub fn format_as_timestamped(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|(offset, text)| format!("[{}] {}\n", format_timestamp(*offset), text))
        .collect()
}

/// Plain paragraphs of two segments each
pub fn format_as_plain(segments: &[Segment]) -> String {
    segments
        .chunks(2)
        .map(|pair| {
            pair.iter()
                .map(|(_, text)| *text)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
        + "\n"
}

/// Length of a transcript in characters, ignoring whitespace
pub fn transcript_length(content: &str) -> usize {
    content.chars().filter(|c| !c.is_whitespace()).count()
}
