//! Terminal styling via crossterm
//!
//! Semantic styling functions that return formatted strings, so the game
//! loop never deals in escape codes directly.

use crossterm::style::{Attribute, Stylize};
use std::fmt::Write;

use crate::emotion::Emotion;
use crate::stats::GameStats;
use crate::transcript::{Line, Speaker};

/// Width of the persuasion meter, in cells
pub const METER_WIDTH: usize = 20;

/// Format the guardian's name with yellow bold
pub fn guardian(name: &str) -> String {
    format!("{}", name.yellow().bold())
}

/// Format the player tag with cyan bold
pub fn player(name: &str) -> String {
    format!("{}", name.cyan().bold())
}

pub fn prompt(text: &str) -> String {
    format!("{}", text.yellow())
}

/// Format status text as dim
pub fn dim(text: &str) -> String {
    format!("{}", text.attribute(Attribute::Dim))
}

/// Format error text as red
pub fn error(text: &str) -> String {
    format!("{}", text.red())
}

/// Format system message as gray
pub fn system(text: &str) -> String {
    format!("{}", text.dark_grey())
}

/// Mood glyph, colored by mood
pub fn emotion(emotion: Emotion) -> String {
    let glyph = emotion.glyph();
    match emotion {
        Emotion::Happy => format!("{}", glyph.green()),
        Emotion::Angry => format!("{}", glyph.red()),
        Emotion::Thinking => format!("{}", glyph.magenta()),
        Emotion::Idle => format!("{}", glyph.dark_grey()),
    }
}

/// Unstyled bar for a 0..=100 percentage
pub fn meter(percent: u8, width: usize) -> String {
    let filled = (usize::from(percent.min(100)) * width + 50) / 100;
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

/// Persuasion meter with percentage, red through yellow to green
pub fn persuasion(percent: u8, mood: Emotion) -> String {
    let bar = meter(percent, METER_WIDTH);
    let bar = match percent {
        0..=33 => format!("{}", bar.red()),
        34..=66 => format!("{}", bar.yellow()),
        _ => format!("{}", bar.green()),
    };
    format!("{} {} {:>3}%", emotion(mood), bar, percent)
}

/// One transcript line as it appears in the terminal
pub fn transcript_line(line: &Line, guardian_name: &str) -> String {
    match line.speaker {
        Speaker::Player => format!("{} {}", player("you:"), line.text),
        Speaker::Guardian => format!("{} {}", guardian(&format!("{}:", guardian_name)), line.text),
        Speaker::System => system(&line.text),
    }
}

/// Create a horizontal line with optional label
pub fn separator(label: Option<&str>, width: u16) -> String {
    let line_char = "─";
    match label {
        Some(l) => {
            let label_len = l.chars().count();
            let side_len = (width.saturating_sub(label_len as u16 + 2) / 2) as usize;
            let side = line_char.repeat(side_len.max(3));
            format!("{}", format!("{} {} {}", side, l, side).dark_grey())
        }
        None => format!("{}", line_char.repeat(width as usize).dark_grey()),
    }
}

/// Box drawing characters
pub struct BoxChars;

impl BoxChars {
    pub const TOP_LEFT: &'static str = "╭";
    pub const TOP_RIGHT: &'static str = "╮";
    pub const BOTTOM_LEFT: &'static str = "╰";
    pub const BOTTOM_RIGHT: &'static str = "╯";
    pub const HORIZONTAL: &'static str = "─";
    pub const VERTICAL: &'static str = "│";
}

/// Create a boxed header
pub fn boxed_header(title: &str, width: u16) -> String {
    let inner_width = (width.saturating_sub(2)) as usize;
    let title_len = title.chars().count();
    let padding = inner_width.saturating_sub(title_len);
    let left_pad = padding / 2;
    let right_pad = padding - left_pad;

    let horizontal = BoxChars::HORIZONTAL.repeat(inner_width);
    let rows = [
        format!("{}{}{}", BoxChars::TOP_LEFT, horizontal, BoxChars::TOP_RIGHT),
        format!(
            "{}{}{}{}{}",
            BoxChars::VERTICAL,
            " ".repeat(left_pad),
            title,
            " ".repeat(right_pad),
            BoxChars::VERTICAL
        ),
        format!("{}{}{}", BoxChars::BOTTOM_LEFT, horizontal, BoxChars::BOTTOM_RIGHT),
    ];

    let mut result = String::new();
    for (i, row) in rows.iter().enumerate() {
        if i > 0 {
            result.push('\n');
        }
        let _ = write!(result, "{}", row.as_str().cyan().bold());
    }
    result
}

/// Victory or defeat screen with the score breakdown
pub fn final_screen(won: bool, stats: &GameStats, width: u16) -> String {
    let title = if won {
        "THE MAP IS YOURS"
    } else {
        "WALK THE PLANK"
    };

    let mut out = boxed_header(title, width);
    let _ = write!(
        out,
        "\n  technique {:>3}\n  style     {:>3}\n  total     {:>3}\n  rank      {}",
        stats.technique,
        stats.style,
        stats.total,
        stats.grade.title().bold()
    );
    out
}
