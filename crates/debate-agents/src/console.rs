//! Terminal rendering and stdin control commands for the runner.

use std::fmt::Write as _;

use debate_scheduler::debate::{
    AnalysisOutcome, FinalAnalysis, RunControl, RunReport, TranscriptEntry, TurnKind,
};

/// A line typed on stdin while a debate runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Pause,
    Resume,
    End,
    Quit,
}

impl ControlCommand {
    /// Parse one input line. Unknown input yields `None`.
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "p" | "pause" => Some(Self::Pause),
            "r" | "resume" | "continue" => Some(Self::Resume),
            "e" | "end" | "end now" => Some(Self::End),
            "q" | "quit" | "cancel" => Some(Self::Quit),
            _ => None,
        }
    }

    pub fn apply(self, control: &RunControl) {
        match self {
            Self::Pause => control.pause(),
            Self::Resume => control.resume(),
            Self::End => control.end_now(),
            Self::Quit => control.cancel(),
        }
    }
}

pub const CONTROL_HELP: &str = "commands: pause | resume | end | quit";

/// One transcript entry as markdown.
pub fn entry_markdown(entry: &TranscriptEntry) -> String {
    let label = match entry.kind {
        TurnKind::Opening => format!("{} - opening", entry.seat),
        TurnKind::Closing => format!("{} - closing", entry.seat),
        TurnKind::Argument => format!("{}, turn {}", entry.seat, entry.turn),
    };
    format!(
        "### {} ({})\n\n{}\n",
        entry.speaker.name,
        label,
        entry.text.trim()
    )
}

/// The analysis as markdown, with a score table.
pub fn analysis_markdown(analysis: &FinalAnalysis) -> String {
    let mut out = String::from("## Analysis\n\n");
    let _ = writeln!(out, "{}\n", analysis.summary.trim());
    if !analysis.participants.is_empty() {
        out.push_str("| Participant | Role | Logic | Evidence | Rhetoric | Total |\n");
        out.push_str("|---|---|---|---|---|---|\n");
        for m in &analysis.participants {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} | {} | {} |",
                m.name,
                m.role,
                m.logic,
                m.evidence,
                m.rhetoric,
                m.total()
            );
        }
        out.push('\n');
        for m in analysis.participants.iter().filter(|m| !m.key_points.is_empty()) {
            let _ = writeln!(out, "**{}**: {}", m.name, m.key_points.join("; "));
        }
    }
    match &analysis.winner {
        Some(winner) => {
            let _ = writeln!(out, "\n**Winner:** {winner}");
        }
        None => out.push_str("\n**Winner:** none declared\n"),
    }
    out
}

/// Closing block printed after a run.
pub fn report_markdown(report: &RunReport) -> String {
    let mut out = format!("---\n\n{}\n\n", report.summary_line());
    match &report.analysis {
        Some(AnalysisOutcome::Completed { analysis }) => out.push_str(&analysis_markdown(analysis)),
        Some(AnalysisOutcome::Failed { message }) => {
            let _ = writeln!(out, "Analysis unavailable: {message}");
        }
        None => {}
    }
    if let Some(id) = report.history_id {
        let _ = writeln!(out, "\nSaved to history as {id}");
    }
    out
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use debate_scheduler::debate::{ModelProvider, Participant, ParticipantMetrics, Role, Seat};

    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(ControlCommand::parse(" Pause "), Some(ControlCommand::Pause));
        assert_eq!(ControlCommand::parse("r"), Some(ControlCommand::Resume));
        assert_eq!(ControlCommand::parse("end now"), Some(ControlCommand::End));
        assert_eq!(ControlCommand::parse("quit"), Some(ControlCommand::Quit));
        assert_eq!(ControlCommand::parse("louder"), None);
    }

    #[test]
    fn test_apply_commands() {
        let control = RunControl::new();
        ControlCommand::Pause.apply(&control);
        assert!(control.signal().paused);
        ControlCommand::Resume.apply(&control);
        assert!(!control.signal().paused);
        ControlCommand::End.apply(&control);
        assert!(control.signal().end_requested);
        ControlCommand::Quit.apply(&control);
        assert!(control.is_cancelled());
    }

    #[test]
    fn test_entry_markdown() {
        let entry = TranscriptEntry {
            speaker: Participant::new("p", Role::Proponent, "Ada", ModelProvider::Gemini),
            seat: Seat::Proponent,
            kind: TurnKind::Argument,
            turn: 2,
            text: "Cars cost cities dearly.\n".to_string(),
            spoken_at: Utc::now(),
        };
        assert_eq!(
            entry_markdown(&entry),
            "### Ada (proponent, turn 2)\n\nCars cost cities dearly.\n"
        );
    }

    #[test]
    fn test_analysis_markdown() {
        let analysis = FinalAnalysis {
            summary: "Close contest.".to_string(),
            participants: vec![ParticipantMetrics {
                name: "Ada".to_string(),
                role: "proponent".to_string(),
                logic: 8,
                evidence: 7,
                rhetoric: 6,
                key_points: vec!["cost".to_string()],
            }],
            winner: None,
        };
        let md = analysis_markdown(&analysis);
        assert!(md.contains("| Ada | proponent | 8 | 7 | 6 | 21 |"));
        assert!(md.contains("**Ada**: cost"));
        assert!(md.contains("none declared"));
    }
}
