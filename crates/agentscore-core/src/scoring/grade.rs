use serde::{Deserialize, Serialize};

/// Letter grade for an efficiency score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    A, // 90-100
    B, // 80-89
    C, // 70-79
    D, // 60-69
    F, // 0-59
}

impl Grade {
    pub fn from_score(score: u8) -> Self {
        match score {
            90.. => Grade::A,
            80..=89 => Grade::B,
            70..=79 => Grade::C,
            60..=69 => Grade::D,
            _ => Grade::F,
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Grade::A => "🌟",
            Grade::B => "✅",
            Grade::C => "🟡",
            Grade::D => "🟠",
            Grade::F => "🔴",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Grade::A => "Almost all spend reached the final answer",
            Grade::B => "Minor avoidable spend",
            Grade::C => "Noticeable waste worth addressing",
            Grade::D => "A large share of spend was avoidable",
            Grade::F => "Most of the spend was waste",
        }
    }
}
