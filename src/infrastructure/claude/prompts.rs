//! Prompt templates for the capability calls.
//!
//! Each template instructs the model to answer with JSON only (except the
//! free-text summary and perspective prompts); the adapter extracts and
//! parses the JSON leniently and treats anything unparseable as a failed
//! call.

use crate::domain::models::TaskKind;

pub fn summarization(previous: &str, new_messages: &str) -> String {
    let previous = if previous.is_empty() {
        "This is the start of the conversation."
    } else {
        previous
    };
    format!(
        "You are maintaining a rolling summary of a live multi-speaker working conversation.\n\n\
         PREVIOUS SUMMARY:\n{previous}\n\n\
         NEW MESSAGES TO FOLD IN:\n{new_messages}\n\n\
         Update the summary to incorporate the new messages. Keep chronological flow, preserve \
         key points from both the previous summary and the new messages, keep speaker \
         attribution for important claims, and note any assistant interventions and their \
         topics. Be concise but informative.\n\n\
         Reply with ONLY the updated summary text, no preamble and no JSON."
    )
}

pub fn topic_inference(messages: &str) -> String {
    format!(
        "Identify which subject areas are being discussed in this conversation.\n\n\
         RECENT CONVERSATION:\n{messages}\n\n\
         List ALL relevant disciplines (for example: Biology / Life Sciences, Chemistry / \
         Biochemistry, Physics / Astronomy, Mathematics / Statistics, Computer Science / \
         Software Engineering, Psychology / Cognitive Science, Business / Economics, \
         Philosophy / Ethics, History / Humanities, Data Science / Machine Learning). Do not \
         limit the number.\n\n\
         Reply with JSON only:\n\
         {{\n  \"active_domains\": [\"domain1\", ...],\n  \"confidence_scores\": {{\"domain1\": 0.9, ...}},\n  \"topic_keywords\": [\"keyword1\", ...]\n}}"
    )
}

pub fn keyword_extraction(text: &str) -> String {
    format!(
        "Extract the key concepts from this message.\n\n\
         MESSAGE:\n{text}\n\n\
         Return 5-10 meaningful keywords capturing the main concepts: technical terms, \
         domain vocabulary, named entities, compound terms (keep \"DNA replication\" or \
         \"machine learning\" together). Ignore filler words and pronouns.\n\n\
         Reply with JSON only:\n{{\n  \"keywords\": [\"keyword1\", \"keyword2\", ...]\n}}"
    )
}

pub fn address_detection(assistant: &str, speaker: &str, text: &str) -> String {
    format!(
        "You are monitoring a live spoken conversation, transcribed by STT, for moments when a \
         speaker addresses the assistant \"{assistant}\" directly. Expect typos, fragments, and \
         misspellings of the name.\n\n\
         Flag as addressing when the name appears with a question or stands alone as a call for \
         attention (\"hey {assistant}\", \"{assistant}, what is RNA?\", \"...and how does that \
         work, {assistant}?\"). Do NOT flag discussion ABOUT the word or concept rather than a \
         direct address.\n\n\
         Message: \"{text}\"\nSpeaker: {speaker}\n\n\
         Reply with JSON only:\n{{\n  \"is_addressing\": true or false\n}}"
    )
}

pub fn follow_up_verification(last_reply: &str, speaker: &str, text: &str) -> String {
    format!(
        "Decide whether this message is a follow-up to the assistant's previous reply.\n\n\
         ASSISTANT'S LAST REPLY:\n{last_reply}\n\n\
         CURRENT MESSAGE:\nSpeaker: {speaker}\nText: {text}\n\n\
         Consider direct references (\"that\", \"you said\"), continuation words (\"also\", \
         \"what about\"), related questions on the same topic, and requests for more detail.\n\n\
         Reply with JSON only:\n{{\n  \"is_follow_up\": true or false\n}}"
    )
}

pub fn decision(assistant: &str, trigger: &str, context: &str, active_domains: &str) -> String {
    format!(
        "You decide whether the assistant \"{assistant}\", which monitors a live working \
         conversation, should reply to a trigger event.\n\n\
         TRIGGER:\n{trigger}\n\n\
         The trigger shows the exact message that fired; the full question may span several of \
         the recent messages below. Consider both.\n\n\
         CONVERSATION CONTEXT:\n{context}\n\n\
         DOMAINS CURRENTLY DISCUSSED: {active_domains}\n\n\
         Choose exactly one path:\n\
         - \"continue\": no question or request was made; the conversation is flowing and \
         nothing is missing. If the speaker asked ANY question after addressing the assistant, \
         do not choose this.\n\
         - \"respond\": the speaker asked a question, an expert perspective is missing, or a \
         factual error needs addressing. missing_domains lists the expert perspectives needed \
         to answer and must not be empty on this path.\n\
         - \"clarify\": the transcription is too garbled or incomplete to determine what was \
         asked.\n\n\
         Note: active_domains is what IS being discussed; missing_domains is what expertise is \
         NEEDED. A question about a domain puts that domain in missing_domains.\n\n\
         Reply with JSON only:\n\
         {{\n  \"decision_path\": \"continue\" | \"respond\" | \"clarify\",\n  \"reasoning\": \"brief explanation\",\n  \"active_domains\": [...],\n  \"missing_domains\": [...],\n  \"urgency\": 0-10,\n  \"task_type\": \"provide_perspective\" | \"translate_jargon\" | \"fill_gap\" | \"factual_correction\"\n}}"
    )
}

pub fn factual_error_detection(conversation: &str) -> String {
    format!(
        "Scan the recent conversation for SERIOUS factual errors that would significantly harm \
         understanding.\n\n\
         CONVERSATION:\n{conversation}\n\n\
         BE VERY CONSERVATIVE:\n\
         - Only flag unambiguous, serious errors (e.g. \"DNA has 3 bases\").\n\
         - Do NOT flag incomplete sentences or truncated speech; this is live transcription.\n\
         - Do NOT flag teaching examples, quiz questions, hypotheticals, or simplified \
         explanations.\n\
         - When in doubt, do not flag.\n\n\
         Reply with JSON only:\n\
         {{\n  \"error_detected\": true/false,\n  \"error_description\": \"what is wrong\",\n  \"correct_information\": \"what should be said instead\",\n  \"severity\": \"low\" | \"medium\" | \"high\",\n  \"domains_needed\": [\"domain1\", ...],\n  \"issue_description\": \"brief description for deduplication\"\n}}"
    )
}

pub fn stuck_detection(conversation: &str, history: &str) -> String {
    format!(
        "Scan the conversation for CLEAR signals that the speakers are genuinely stuck and need \
         help.\n\n\
         CONVERSATION:\n{conversation}\n\n\
         PREVIOUS ASSISTANT CONTRIBUTIONS:\n{history}\n\n\
         BE VERY CONSERVATIVE. Only flag clear, obvious signals: the same question asked \
         repeatedly with no answer, several unanswered questions on one topic, explicit \
         uncertainty (\"I'm completely lost\"), strong frustration, explicit requests for help, \
         or explicit jargon confusion. Do NOT flag normal teaching flow, rhetorical questions, \
         or casual uncertainty, and do not re-flag issues the assistant already addressed. When \
         in doubt, do not flag.\n\n\
         Reply with JSON only:\n\
         {{\n  \"stuck_detected\": true/false,\n  \"stuck_type\": \"repeated_questions\" | \"unanswered_questions\" | \"uncertainty\" | \"negative_sentiment\" | \"jargon_confusion\" | null,\n  \"description\": \"what the issue is\",\n  \"severity\": \"low\" | \"medium\" | \"high\",\n  \"domains_needed\": [\"domain1\", ...],\n  \"issue_description\": \"brief description for deduplication\"\n}}"
    )
}

pub fn semantic_similarity(first: &str, second: &str) -> String {
    format!(
        "Compare these two issue descriptions.\n\n\
         ISSUE 1:\n{first}\n\n\
         ISSUE 2:\n{second}\n\n\
         Are they describing the SAME underlying issue or question? Would addressing one \
         resolve the other?\n\n\
         Reply with JSON only:\n{{\n  \"are_similar\": true or false\n}}"
    )
}

pub fn perspective(
    domain: &str,
    context: &str,
    active_domains: &str,
    history: &str,
    task: TaskKind,
) -> String {
    let task_instructions = match task {
        TaskKind::TranslateJargon => format!(
            "The conversation used terminology from another field. Translate the concept into \
             {domain} terms with analogies someone outside the field would follow."
        ),
        TaskKind::FillGap => format!(
            "The conversation has a gap in {domain} knowledge. Fill it by explaining the \
             relevant concepts and connecting them to what the speakers are working on."
        ),
        TaskKind::FactualCorrection => format!(
            "There is a factual error in the conversation about {domain}. Give the correct \
             information clearly, and briefly explain why the misconception is common if that \
             helps."
        ),
        TaskKind::ProvidePerspective | TaskKind::Clarification => format!(
            "The conversation is missing your perspective from {domain}. Provide the \
             considerations from {domain} the speakers should be thinking about, without \
             repeating what was already discussed."
        ),
    };

    format!(
        "You are a specialist in {domain}, explaining at the level of a researcher talking to \
         capable non-specialists.\n\n\
         CONVERSATION CONTEXT:\n{context}\n\n\
         DOMAINS CURRENTLY DISCUSSED: {active_domains}\n\n\
         PREVIOUS ASSISTANT CONTRIBUTIONS:\n{history}\n\n\
         YOUR TASK: {task_instructions}\n\n\
         Be concise (2-4 sentences), bridge technical concepts with plain language, and do not \
         repeat anything from the previous contributions.\n\n\
         Reply with only the perspective, no preamble and no JSON."
    )
}
