#![forbid(unsafe_code)]

/// Deterministic: the same schema and question always render the same prompt.
pub fn render_prompt(schema: &str, question: &str) -> String {
    format!(
        "Convert this natural language query to SQL.\n\
\n\
Database Schema:\n\
{schema}\n\
\n\
Natural Language Query: {question}\n\
\n\
You must respond with ONLY a JSON object in this exact format:\n\
{{\"sql\": \"SELECT * FROM data WHERE...\"}}\n\
\n\
Do not include any other text, explanations, or markdown formatting. Only return the JSON object."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_embeds_schema_and_question() {
        let schema = "Table: data_x\nColumns:\n  - a (TEXT)\n";
        let prompt = render_prompt(schema, "how many rows?");
        assert!(prompt.contains("Database Schema:\nTable: data_x\nColumns:\n  - a (TEXT)\n"));
        assert!(prompt.contains("Natural Language Query: how many rows?\n"));
        assert!(prompt.contains(r#"{"sql": "SELECT * FROM data WHERE..."}"#));
        assert_eq!(prompt, render_prompt(schema, "how many rows?"));
    }
}
