//! System prompts, user-profile context and the Llama 3 chat template.

use serde::{Deserialize, Serialize};

pub const CHAT_SYSTEM_PROMPT: &str = "You are a knowledgeable Medical AI Assistant.
USER PROFILE CONTEXT (if provided): Consider the user's age, gender, conditions, and allergies for more personalized and relevant answers. Do not explicitly restate the profile unless asked. Only reply to Question asked.
TASK: Provide helpful and informative answers to general medical queries in a clear and understanding way. If you don't know the answer or if it's a serious medical issue, advise seeking professional help from a doctor.
4. In case there are specialised medical terms, explain them in simple english(eg: . Pneumoperitoneum)
5. Do **NOT** generate quizzes, exam questions, or multiple-choice answers.
6. Do **NOT** ask the user to choose between A/B/C/D.";

pub const EMERGENCY_SYSTEM_PROMPT: &str = "You are an Emergency First Aid Advisor.
USER PROFILE CONTEXT (if provided): Consider the user's age, known conditions, and allergies when providing steps, but prioritize immediate life-saving actions.
TASK: Provide immediate, actionable, step-by-step first aid instructions for a layperson based STRICTLY on the situation and symptoms provided in the user prompt.
PRIORITY 1: If the situation sounds potentially life-threatening (e.g., stroke symptoms, unconsciousness, severe bleeding, difficulty breathing), your FIRST step MUST be '1. Call emergency services (like 911, 112, etc.) immediately!'.
Then, list ONLY simple, practical steps the person can take WHILE WAITING for professional help. Number each step (1., 2., 3., ...). Use simple language. Be concise and direct. ENSURE specific maneuvers are recommended when appropriate (eg: Heimlich for choking).
DO NOT explain medical conditions. DO NOT add conversational filler. Just provide the comprehensive numbered steps.
5. Do **NOT** generate quizzes, exam questions, or multiple-choice answers.
6. Do **NOT** ask the user to choose between A/B/C/D.";

const BEGIN_OF_TEXT: &str = "<|begin_of_text|>";
const START_HEADER: &str = "<|start_header_id|>";
const END_HEADER: &str = "<|end_header_id|>";
const END_OF_TURN: &str = "<|eot_id|>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Descriptive user data folded into the system prompt.
///
/// `name`, `weight_kg`, `height_cm` and `blood_type` are accepted from
/// clients but not rendered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub conditions: Option<Vec<String>>,
    #[serde(default)]
    pub allergies: Option<Vec<String>>,
    #[serde(default)]
    pub medications: Option<Vec<String>>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub weight_kg: Option<f64>,
    #[serde(default)]
    pub height_cm: Option<f64>,
    #[serde(default)]
    pub blood_type: Option<String>,
}

impl UserProfile {
    /// One `- Label: value` line per present, non-empty field.
    pub fn context_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();

        if let Some(age) = self.age.filter(|age| *age > 0) {
            lines.push(format!("- Age: {}", age));
        }
        if let Some(gender) = non_empty(&self.gender) {
            lines.push(format!("- Gender: {}", gender));
        }
        if let Some(conditions) = non_empty_list(&self.conditions) {
            lines.push(format!("- Known Conditions: {}", conditions.join(", ")));
        }
        if let Some(allergies) = non_empty_list(&self.allergies) {
            lines.push(format!("- Known Allergies: {}", allergies.join(", ")));
        }
        if let Some(medications) = non_empty_list(&self.medications) {
            lines.push(format!("- Current Medications: {}", medications.join(", ")));
        }

        lines
    }

    /// The `User Profile:` block, or `None` when no field would be rendered.
    pub fn render(&self) -> Option<String> {
        let lines = self.context_lines();
        if lines.is_empty() {
            return None;
        }
        Some(format!("User Profile:\n{}", lines.join("\n")))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn non_empty_list(value: &Option<Vec<String>>) -> Option<&[String]> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Prepends the rendered profile, if any, to the endpoint's base system prompt.
pub fn system_prompt(base: &str, profile: Option<&UserProfile>) -> String {
    match profile.and_then(UserProfile::render) {
        Some(block) => format!("{}\n\n{}", block.trim(), base),
        None => base.to_string(),
    }
}

/// `system`, then the prior turns in order, then the new user turn.
pub fn build_messages(
    system_prompt: String,
    history: &[ChatMessage],
    user_content: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::new(Role::System, system_prompt));
    messages.extend(history.iter().cloned());
    messages.push(ChatMessage::new(Role::User, user_content));
    messages
}

pub fn apply_chat_template(messages: &[ChatMessage], add_generation_prompt: bool) -> String {
    let mut prompt = String::from(BEGIN_OF_TEXT);

    for msg in messages {
        push_header(&mut prompt, msg.role);
        prompt.push_str(msg.content.trim());
        prompt.push_str(END_OF_TURN);
    }

    if add_generation_prompt {
        push_header(&mut prompt, Role::Assistant);
    }
    prompt
}

fn push_header(prompt: &mut String, role: Role) {
    prompt.push_str(START_HEADER);
    prompt.push_str(role.as_str());
    prompt.push_str(END_HEADER);
    prompt.push_str("\n\n");
}

/// Full pipeline from endpoint inputs to the model-ready prompt string.
pub fn render_prompt(
    base_system_prompt: &str,
    profile: Option<&UserProfile>,
    history: &[ChatMessage],
    user_content: &str,
) -> String {
    let messages = build_messages(
        system_prompt(base_system_prompt, profile),
        history,
        user_content,
    );
    apply_chat_template(&messages, true)
}
