//! Prompt templates for utterances and the final analysis.
//!
//! Bump `PROMPT_VERSION` whenever template wording changes so logged
//! responses can be traced back to the prompt that produced them.

use debate_scheduler::debate::{
    AnalysisRequest, DebateConfig, FinalAnalysis, Seat, Transcript, TurnKind, UtteranceRequest,
};

/// Prompt version. Bump on any template change.
pub const PROMPT_VERSION: &str = "1.2.0";

/// A system/user prompt pair, mapped onto each provider's wire format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

const MODERATOR_OPENING: &str = "\
You are the moderator of a structured debate. Open the debate: introduce the \
topic, state why it matters, introduce each participant by name and side, and \
invite the first speaker to begin. Do not argue either side.";

const MODERATOR_CLOSING: &str = "\
You are the moderator of a structured debate. Every participant has used their \
turns. Close the debate: summarize the strongest point from each side fairly, \
note where they agreed or talked past each other, and thank the participants. \
Do not declare a winner.";

const MODERATOR_INTERJECTION: &str = "\
You are the moderator of a structured debate. Briefly steer the discussion back \
to the open questions without taking a side.";

const PROPONENT: &str = "\
You argue FOR the motion. Build your case, answer the most recent objections \
directly, and do not concede the core claim.";

const OPPONENT: &str = "\
You argue AGAINST the motion. Challenge the other side's premises and evidence, \
answer the most recent points directly, and do not concede the core claim.";

const NEUTRAL: &str = "\
You are a neutral panelist. Weigh both sides, press each on its weakest point, \
and add perspective neither side has raised.";

const ANALYST: &str = "\
You are an impartial debate judge. Read the full transcript and score every \
participant on logic, evidence, and rhetoric from 0 to 10. List each \
participant's key points, write an overall summary, and name a winner only if \
one side clearly prevailed.";

fn role_instructions(seat: Seat, kind: TurnKind) -> &'static str {
    match (seat, kind) {
        (Seat::Moderator, TurnKind::Opening) => MODERATOR_OPENING,
        (Seat::Moderator, TurnKind::Closing) => MODERATOR_CLOSING,
        (Seat::Moderator, TurnKind::Argument) => MODERATOR_INTERJECTION,
        (Seat::Proponent, _) => PROPONENT,
        (Seat::Opponent, _) => OPPONENT,
        (Seat::Neutral(_), _) => NEUTRAL,
    }
}

fn style_block(config: &DebateConfig) -> String {
    format!(
        "## Style\n- Length: {}\n- Depth: {}\n- Tone: {}",
        config.length.guidance(),
        config.quality.guidance(),
        config.tone.guidance()
    )
}

fn focus_block(config: &DebateConfig) -> Option<String> {
    if config.focus_points.is_empty() {
        return None;
    }
    let points = config
        .focus_points
        .iter()
        .map(|p| format!("- {p}"))
        .collect::<Vec<_>>()
        .join("\n");
    Some(format!("## Focus points\n{points}"))
}

fn participants_block(config: &DebateConfig) -> String {
    let lines = config
        .roster
        .iter()
        .map(|p| format!("- {} ({})", p.name, p.role))
        .collect::<Vec<_>>()
        .join("\n");
    format!("## Participants\n{lines}")
}

fn transcript_block(transcript: &Transcript) -> String {
    if transcript.is_empty() {
        "## Transcript\n(no one has spoken yet)".to_string()
    } else {
        format!("## Transcript\n{}", transcript.render_plain())
    }
}

/// Prompt for one participant's next utterance.
pub fn utterance_prompt(request: &UtteranceRequest) -> Prompt {
    let config = &request.config;
    let speaker = &request.speaker;

    let mut system = format!(
        "You are {}. {}\n\nStay in character. Reply with your spoken words only: \
         no speaker label, no stage directions, no markdown headings.",
        speaker.name,
        role_instructions(request.seat, request.kind)
    );
    if let Some(persona) = &speaker.persona {
        system.push_str(&format!("\n\nPersona: {persona}"));
    }
    system.push_str("\n\n");
    system.push_str(&style_block(config));

    let mut sections = vec![
        format!("## Motion\n{}", config.topic),
        participants_block(config),
    ];
    sections.extend(focus_block(config));
    sections.push(transcript_block(&request.transcript));

    let ask = match request.kind {
        TurnKind::Opening => "Deliver your opening remarks now.".to_string(),
        TurnKind::Closing => "Deliver your closing remarks now.".to_string(),
        TurnKind::Argument if request.seat.is_moderator() => {
            "Deliver a short moderating remark now.".to_string()
        }
        TurnKind::Argument => format!(
            "This is your turn {} of {}. Respond now.",
            request.turn, config.turn_limit
        ),
    };
    sections.push(ask);

    Prompt {
        system,
        user: sections.join("\n\n"),
    }
}

/// Prompt for the end-of-run analysis. The response must be JSON matching
/// the embedded schema.
pub fn analysis_prompt(request: &AnalysisRequest) -> Prompt {
    let schema = serde_json::to_string_pretty(&FinalAnalysis::json_schema()).unwrap_or_default();
    let system = format!(
        "{ANALYST}\n\nRespond with a single JSON object and nothing else. \
         It must match this JSON schema:\n{schema}"
    );

    let mut sections = vec![
        format!("## Motion\n{}", request.config.topic),
        participants_block(&request.config),
    ];
    sections.extend(focus_block(&request.config));
    sections.push(transcript_block(&request.transcript));
    sections.push(
        "Score every participant listed above, using their display names exactly.".to_string(),
    );

    Prompt {
        system,
        user: sections.join("\n\n"),
    }
}
