//! Prompt templates for each generation step.
//!
//! Templates use `{name}` placeholders filled from the request inputs.
//! String inputs are inserted verbatim, everything else as compact JSON.

use serde_json::{Map, Value};

use crate::llm::GenerationStep;

/// Fixed answer for help questions.
pub const HELP_TEXT: &str = "I am your data assistant. I help you explore your data, answer questions, and generate insights.
I can help you:
  Analyze & Report: summarize trends, slice results, and compare segments.
  Query Databases: turn questions into SQL and run them to fetch results.
  Explain Results: give clear summaries and optional visualizations.
  Iterate: refine queries, add filters, and explore follow-up questions.";

/// Fixed answer when repairs are exhausted.
pub const NO_ANSWER_TEXT: &str = "I'm sorry, I don't have an answer for that question.";

const INTENT: &str = "Classify the user's intent based on their question and the conversation history.
Current question: {question}
Conversation history: {history}

Categories:
- general: greetings, pleasantries, casual conversation (hi, hello, bye, thanks)
- help: questions about what the assistant can do or how to use it
- system_query: questions about data, queries, analytics, trends or reports

Use the history for context: a follow-up to an earlier data question is system_query.

Respond with only the category name (general, help, or system_query).";

const GREETING: &str = "You are a friendly data assistant. Reply briefly and warmly to the user's message, and mention that you can answer questions about their data.
User message: {question}";

const TEXT_TO_SQL: &str = "You are an expert PostgreSQL query generator. Write one syntactically correct PostgreSQL query that answers the question.

User question: {question}
Conversation history: {history}
Selected tables: {selected_tables}
Semantic information: {semantic_info}

Rules:
- Use only tables from the selected tables and only columns present in the semantic information.
- Use foreign keys from the semantic information for joins, with table aliases.
- When a column lists unique_values or sample_values, filter with those exact values.
- For text filters use LOWER(column) LIKE LOWER('%value%') or LOWER(column) IN (...).
- Double-quote reserved words and case-sensitive identifiers.
- Add ORDER BY for stable results and LIMIT 50 unless the user asks for a different number.
- For follow-up questions keep filters from the history unless the user changes them.

Return only the SQL query: no explanation, no comments, no code fences.";

const REPAIR: &str = "You are a senior PostgreSQL debugging assistant. A query failed to execute. Diagnose the error and produce a corrected query.

User question: {question}
Current SQL (may be wrong): {sql_query}
Error message: {error_message}
Table semantic information: {semantic_info}
Previous errors (most recent last): {previous_errors}

Rules:
- Prefer minimal edits that fix the error while keeping the intent.
- Use only existing tables and columns from the semantic information.
- Keep LIMIT 50 if no limit is present.

Return only the corrected SQL: no explanation, no code fences.";

const SUMMARIZE: &str = "Summarize the query result for the user's question.

User question: {question}
Query result: {query_result}
Previous conversation: {history}

Be clear and concise, highlight key numbers, trends and comparisons, and avoid jargon.
Respond with only the summary.";

const VISUALIZE: &str = "You are an ECharts visualization generator. Build a chart configuration from the query result.

Question: {question}
SQL query: {sql_query}
Query result: {query_result}
Previous conversation: {history}

Rules:
- Return only a valid JSON object: no markdown, no code fences, no explanation.
- Use the actual column names and values from the query result.
- Bar charts compare categories, line charts show trends over time, pie charts show proportions. Default to bar.
- Include title, tooltip, xAxis, yAxis and series.
- If the result has no meaningful data return {\"title\": {\"text\": \"No data to visualize\"}}.";

const FOLLOW_UPS: &str = "Question: {question}
Conversation history: {history}
Semantic information: {semantic_info}
Query result: {query_result}

Generate exactly 3 short follow-up questions relevant to the inputs.
Return only JSON in this shape, without code fences:
{\"follow_up_questions\": [\"question1\", \"question2\", \"question3\"]}";

/// Template for a step.
pub fn template(step: GenerationStep) -> &'static str {
    match step {
        GenerationStep::Intent => INTENT,
        GenerationStep::Greeting => GREETING,
        GenerationStep::TextToSql => TEXT_TO_SQL,
        GenerationStep::Repair => REPAIR,
        GenerationStep::Summarize => SUMMARIZE,
        GenerationStep::Visualize => VISUALIZE,
        GenerationStep::FollowUps => FOLLOW_UPS,
    }
}

/// Fill a step's template from `inputs`. Unknown placeholders are left as is.
pub fn render(step: GenerationStep, inputs: &Map<String, Value>) -> String {
    let mut prompt = template(step).to_string();
    for (key, value) in inputs {
        let text = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        prompt = prompt.replace(&format!("{{{key}}}"), &text);
    }
    prompt
}
