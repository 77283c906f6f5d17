//! Prompt templates for SOP generation and grounded Q&A.
//!
//! Templates use `{placeholder}` slots filled by [`render_prompt`] in a
//! single pass, so slot-like text inside a substituted value is never
//! expanded:
//!
//! | Slot              | Value                                               |
//! |-------------------|-----------------------------------------------------|
//! | `{language}`      | target language, e.g. `English`                     |
//! | `{style}`         | writing style, e.g. `professional`                  |
//! | `{sop_id}`        | `SOP-YYYY-MMDD-V1` for the generation date          |
//! | `{date}`          | long date, e.g. `January 01, 2026`                  |
//! | `{duration_info}` | duration + reference timestamps, or empty           |
//! | `{transcript}`    | the raw transcript                                  |
//!
//! Each built-in [`crate::audit::RuleSet`] carries its own template so the
//! model is asked for exactly the structure the audit will look for.

use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static RE_SLOT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([a-z_]+)\}").unwrap());

/// Replace every `{name}` slot for which `value` returns `Some`; unknown
/// slots are left as written.
fn fill_slots<'a>(template: &str, value: impl Fn(&str) -> Option<&'a str>) -> String {
    RE_SLOT
        .replace_all(template, |caps: &Captures<'_>| match value(&caps[1]) {
            Some(v) => v.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// One-shot prompt paired with the `safety` rule set.
pub const SAFETY_SOP_PROMPT: &str = r#"You are an expert Technical Writer specializing in Standard Operating Procedures (SOPs).

Act as a Technical Writer. Rewrite the transcript into a {style} SOP in {language}.

Follow this EXACT format (but write the content in {language}):

### EXAMPLE OUTPUT:
---
**DOCUMENT METADATA**
- SOP-ID: SOP-2026-0101-V1
- Date: January 01, 2026
- Classification: Standard Operating Procedure

**TITLE:** How to Reset the Network Router

**OBJECTIVE:** Safely reset network equipment to restore connectivity.

**SCOPE:** This procedure applies to all IT support personnel handling network equipment maintenance.

**PROCEDURE:**

Step 1: Locate the small black reset button on the back panel of the router.

Step 2: Using a paperclip or pin, press and hold the button for 10 seconds.

Step 3: Wait until the LED indicator flashes amber, indicating reset initiation.

Step 4: Release the button and wait 60 seconds for the device to reboot.

Step 5: Verify connectivity by checking the status lights (green = operational).

**COMPLIANCE NOTES:**
- Always document the reset in the maintenance log.
- If issues persist after reset, escalate to Level 2 support.
---

### YOUR TASK:
Using the EXACT format above, rewrite this transcript into a {style} SOP.
IMPORTANT: Write the entire SOP content in {language}.

SOP-ID to use: {sop_id}
Date: {date}
{duration_info}

TRANSCRIPT:
{transcript}

{style} SOP (in {language}):"#;

/// Sectioned prompt paired with the `structure` rule set.
///
/// Section 3 asks for a plain-text flowchart so the layout engine can set it
/// in a fixed-width font.
pub const STRUCTURED_SOP_PROMPT: &str = r#"You are an expert Technical Writer specializing in Standard Operating Procedures (SOPs).

Rewrite the transcript below into a {style} SOP written entirely in {language}.
Your answer MUST contain exactly these four section markers, each alone on its own line:

SECTION 1:
Title, SOP-ID ({sop_id}), date ({date}), objective and scope.

SECTION 2:
The procedure as numbered steps ("Step 1: ...", "Step 2: ...").

SECTION 3:
FLOWCHART: a plain-text flowchart of the procedure using [START], boxes and --> arrows.
Then a line starting with "Explanation:" followed by a short description of the flow.

SECTION 4:
Compliance notes, warnings and escalation paths as a bulleted list.

Do not add any text before SECTION 1.
{duration_info}

TRANSCRIPT:
{transcript}

SOP (in {language}):"#;

/// System prompt for grounded Q&A over a generated SOP.
pub const QA_PROMPT: &str = r#"You are a helpful assistant that answers questions about Standard Operating Procedures.
Answer the following question using ONLY the information provided in the context below.
If the answer is not in the context, say "I cannot find this information in the document."

Context:
{context}

Question: {question}

Answer:"#;

/// Values substituted into a generation template.
#[derive(Debug, Clone)]
pub struct PromptVars<'a> {
    pub language: &'a str,
    pub style: &'a str,
    pub transcript: &'a str,
    pub duration_secs: f64,
    pub cues: &'a [f64],
}

/// SOP identifier for a generation date, e.g. `SOP-2026-0101-V1`.
pub fn sop_id(now: &DateTime<Local>) -> String {
    now.format("SOP-%Y-%m%d-V1").to_string()
}

/// Duration line handed to the model, or empty when the duration is unknown.
pub fn duration_info(duration_secs: f64, cues: &[f64]) -> String {
    if !(duration_secs > 0.0) {
        return String::new();
    }
    let mut info = format!("\n\nVideo Duration: {} seconds.", duration_secs as u64);
    if !cues.is_empty() {
        let stamps: Vec<String> = cues.iter().map(|t| format!("{}s", *t as u64)).collect();
        info.push_str(&format!(" Reference timestamps: {}.", stamps.join(", ")));
    }
    info
}

/// Fill every slot of `template`.
pub fn render_prompt(template: &str, vars: &PromptVars<'_>, now: &DateTime<Local>) -> String {
    let id = sop_id(now);
    let date = now.format("%B %d, %Y").to_string();
    let info = duration_info(vars.duration_secs, vars.cues);
    fill_slots(template, |name| match name {
        "language" => Some(vars.language),
        "style" => Some(vars.style),
        "sop_id" => Some(id.as_str()),
        "date" => Some(date.as_str()),
        "duration_info" => Some(info.as_str()),
        "transcript" => Some(vars.transcript),
        _ => None,
    })
}

/// Build the Q&A prompt.
pub fn qa_prompt(question: &str, context: &str) -> String {
    fill_slots(QA_PROMPT, |name| match name {
        "question" => Some(question),
        "context" => Some(context),
        _ => None,
    })
}
