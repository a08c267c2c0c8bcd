//! Safety evaluation questionnaire.
//!
//! Turns questionnaire answers into a scored assessment prompt for the
//! chatbot. Answers are keyed by 1-based question number and may be "yes",
//! "no", or free text (counted as partial credit).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Input for a safety evaluation: zipcode plus questionnaire answers.
#[derive(Debug, Clone, Deserialize)]
pub struct EvaluationData {
    #[serde(default = "default_zipcode")]
    pub zipcode: String,
    /// 1-based question number -> answer.
    #[serde(default)]
    pub answers: BTreeMap<usize, String>,
    #[serde(default)]
    pub questions: Vec<String>,
}

fn default_zipcode() -> String {
    "Unknown".into()
}

/// Summary statistics derived from questionnaire answers.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EvaluationStats {
    pub total_questions: usize,
    pub answered: usize,
    pub yes_count: usize,
    pub no_count: usize,
    pub text_entries_count: usize,
    /// 1..=10. Yes answers score full credit, text answers half.
    pub preparedness_score: u8,
    pub completion_rate: f64,
}

fn is_text_answer(answer: &str) -> bool {
    !matches!(answer, "yes" | "no" | "not answered")
}

/// Preparedness score on a 1-10 scale.
///
/// Maps the credit ratio onto 1..=10 so zero credit scores 1 and full
/// credit scores 10, rounding half-up like the original scoring sheet.
fn preparedness_score(
    yes_count: usize,
    text_count: usize,
    answered: usize,
    total_questions: usize,
) -> u8 {
    if answered == 0 || total_questions == 0 {
        return 1;
    }
    let credit = yes_count as f64 + 0.5 * text_count as f64;
    let normalized = (credit / total_questions as f64) * 9.0 + 1.0;
    normalized.round().clamp(1.0, 10.0) as u8
}

/// Compute summary statistics for an evaluation.
pub fn summary_stats(data: &EvaluationData) -> EvaluationStats {
    let total_questions = data.questions.len();
    let answered = data.answers.len();
    let yes_count = data.answers.values().filter(|a| a.as_str() == "yes").count();
    let no_count = data.answers.values().filter(|a| a.as_str() == "no").count();
    let text_entries_count = data
        .answers
        .values()
        .filter(|a| is_text_answer(a))
        .count();

    EvaluationStats {
        total_questions,
        answered,
        yes_count,
        no_count,
        text_entries_count,
        preparedness_score: preparedness_score(yes_count, text_entries_count, answered, total_questions),
        completion_rate: if total_questions > 0 {
            answered as f64 / total_questions as f64 * 100.0
        } else {
            0.0
        },
    }
}

/// Build the evaluation prompt sent to the model.
///
/// Groups answers into strengths, text responses, and areas needing
/// attention, embeds the score, and pins the verified emergency contact
/// numbers so the model never invents them.
pub fn generate_prompt(data: &EvaluationData) -> String {
    let stats = summary_stats(data);
    let not_answered = stats.total_questions.saturating_sub(stats.answered);

    let mut strengths = Vec::new();
    let mut concerns = Vec::new();
    let mut text_responses = Vec::new();

    for (idx, question) in data.questions.iter().enumerate() {
        let number = idx + 1;
        match data.answers.get(&number).map(String::as_str) {
            Some("yes") => strengths.push(format!("Question {}: {}", number, question)),
            Some("no") => concerns.push(format!("Question {}: {}", number, question)),
            Some(answer) if is_text_answer(answer) => text_responses.push(format!(
                "Question {}: {}\n   Response: {}",
                number, question, answer
            )),
            _ => {}
        }
    }

    let mut parts = vec![
        format!(
            "Provide a focused safety assessment for zipcode {} in Corpus Christi, Texas.",
            data.zipcode
        ),
        String::new(),
        "PREPAREDNESS SCORE:".into(),
        format!("- Overall Preparedness Score: {}/10", stats.preparedness_score),
        format!(
            "  (Based on {} fully prepared areas, {} partially prepared areas, {} areas needing attention)",
            stats.yes_count, stats.text_entries_count, stats.no_count
        ),
        String::new(),
        "QUESTIONNAIRE SUMMARY:".into(),
        format!("- Total questions: {}", stats.total_questions),
        format!("- Answered: {}", stats.answered),
        format!("- Strengths (Yes): {}", stats.yes_count),
        format!("- Partial Responses (Text): {}", stats.text_entries_count),
        format!("- Areas needing attention (No): {}", stats.no_count),
        format!("- Not answered: {}", not_answered),
    ];

    if !strengths.is_empty() {
        parts.push(String::new());
        parts.push("STRENGTHS (Areas where user is prepared):".into());
        for s in &strengths {
            parts.push(format!("\u{2022} {}", s));
        }
    }

    if !text_responses.is_empty() {
        parts.push(String::new());
        parts.push("TEXT RESPONSES (Detailed answers):".into());
        for t in &text_responses {
            parts.push(format!("\u{2022} {}", t));
        }
    }

    if !concerns.is_empty() {
        parts.push(String::new());
        parts.push("AREAS NEEDING ATTENTION (Immediate focus areas):".into());
        for c in &concerns {
            parts.push(format!("\u{2022} {}", c));
        }
    }

    if not_answered > 0 {
        parts.push(String::new());
        parts.push(format!(
            "NOTE: {} question(s) were not answered. Focus recommendations on answered questions, but mention these gaps briefly.",
            not_answered
        ));
    }

    parts.push(String::new());
    parts.push("VERIFIED EMERGENCY CONTACTS (Use ONLY these numbers):".into());
    parts.push("911 (Emergency), (361) 886-2600 (Police Non-Emergency), (361) 826-3900 (Fire/OEM), (361) 826-2489 (City Services),".into());
    parts.push("1-800-RED-CROSS (Red Cross), (361) 884-9497 (Salvation Army), 1-800-621-3362 (FEMA), 211 (Texas Services),".into());
    parts.push("1-800-985-5990 (Disaster Distress Helpline), (361) 887-6291 (Food Bank), (361) 289-0959 (Weather Service).".into());
    parts.push(String::new());
    parts.push("REQUIRED OUTPUT FORMAT (be concise, avoid repetition):".into());
    parts.push(String::new());
    parts.push(format!("1. PREPAREDNESS SCORE: {}/10", stats.preparedness_score));
    parts.push(format!(
        "   - Start with: 'Your overall preparedness score is {}/10'",
        stats.preparedness_score
    ));
    parts.push("   - Brief explanation of what the score means".into());
    parts.push(String::new());
    parts.push("2. QUICK ASSESSMENT (2-3 sentences):".into());
    parts.push("   - Overall preparedness level based on answers and score".into());
    parts.push("   - Main strengths identified".into());
    parts.push(String::new());
    parts.push("3. PRIORITY RECOMMENDATIONS (only for 'No' answers and unanswered questions):".into());
    parts.push("   - Focus on 3-5 most critical action items".into());
    parts.push("   - Be specific and actionable".into());
    parts.push(format!(
        "   - Prioritize based on zipcode {} risks (coastal/hurricane/flood)",
        data.zipcode
    ));
    parts.push(String::new());
    parts.push(format!("4. AREA-SPECIFIC RISKS for zipcode {}:", data.zipcode));
    parts.push("   - Brief note on hurricane season, flood zones, storm surge if applicable".into());
    parts.push(String::new());
    parts.push("5. ESSENTIAL CONTACTS (only list relevant ones, don't repeat all):".into());
    parts.push("   - Include contacts relevant to their specific needs based on answers".into());
    parts.push("   - Use ONLY the verified numbers provided above".into());
    parts.push(String::new());
    parts.push("CRITICAL INSTRUCTIONS:".into());
    parts.push("- Do NOT repeat information multiple times".into());
    parts.push("- Focus recommendations on specific 'No' answers and gaps".into());
    parts.push("- If most/all questions are unanswered, provide a brief general preparedness guide".into());
    parts.push("- Keep each section concise (2-4 items max)".into());
    parts.push("- All phone numbers must be 100% accurate".into());
    parts.push("- Be practical and actionable, not generic".into());
    parts.push(String::new());

    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(questions: &[&str], answers: &[(usize, &str)]) -> EvaluationData {
        EvaluationData {
            zipcode: "78401".into(),
            questions: questions.iter().map(|q| q.to_string()).collect(),
            answers: answers
                .iter()
                .map(|(i, a)| (*i, a.to_string()))
                .collect(),
        }
    }

    #[test]
    fn score_is_one_when_nothing_answered() {
        let stats = summary_stats(&data(&["q1", "q2"], &[]));
        assert_eq!(stats.preparedness_score, 1);
        assert_eq!(stats.completion_rate, 0.0);
    }

    #[test]
    fn score_is_ten_when_all_yes() {
        let stats = summary_stats(&data(&["q1", "q2"], &[(1, "yes"), (2, "yes")]));
        assert_eq!(stats.preparedness_score, 10);
        assert_eq!(stats.completion_rate, 100.0);
    }

    #[test]
    fn text_answers_earn_half_credit() {
        // credit 1.5 of 2 -> 1.5/2*9+1 = 7.75 -> 8
        let stats = summary_stats(&data(
            &["q1", "q2"],
            &[(1, "yes"), (2, "we keep supplies in the garage")],
        ));
        assert_eq!(stats.yes_count, 1);
        assert_eq!(stats.text_entries_count, 1);
        assert_eq!(stats.preparedness_score, 8);
    }

    #[test]
    fn all_no_scores_minimum() {
        let stats = summary_stats(&data(&["q1", "q2"], &[(1, "no"), (2, "no")]));
        assert_eq!(stats.no_count, 2);
        assert_eq!(stats.preparedness_score, 1);
    }

    #[test]
    fn prompt_groups_answers_by_kind() {
        let prompt = generate_prompt(&data(
            &["Do you have an emergency kit?", "Do you know your evacuation route?", "Where do you store water?"],
            &[(1, "yes"), (2, "no"), (3, "in the pantry")],
        ));

        assert!(prompt.contains("zipcode 78401"));
        assert!(prompt.contains("STRENGTHS (Areas where user is prepared):"));
        assert!(prompt.contains("Question 1: Do you have an emergency kit?"));
        assert!(prompt.contains("AREAS NEEDING ATTENTION (Immediate focus areas):"));
        assert!(prompt.contains("Question 2: Do you know your evacuation route?"));
        assert!(prompt.contains("TEXT RESPONSES (Detailed answers):"));
        assert!(prompt.contains("Response: in the pantry"));
        assert!(prompt.contains("VERIFIED EMERGENCY CONTACTS"));
    }

    #[test]
    fn prompt_notes_unanswered_questions() {
        let prompt = generate_prompt(&data(&["q1", "q2", "q3"], &[(1, "yes")]));
        assert!(prompt.contains("2 question(s) were not answered"));
    }

    #[test]
    fn prompt_embeds_score() {
        let prompt = generate_prompt(&data(&["q1"], &[(1, "yes")]));
        assert!(prompt.contains("Overall Preparedness Score: 10/10"));
        assert!(prompt.contains("'Your overall preparedness score is 10/10'"));
    }
}
