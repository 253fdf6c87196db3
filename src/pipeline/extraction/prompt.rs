use crate::pipeline::knowledge::KnowledgeBase;

pub const EXTRACTION_SYSTEM_PROMPT: &str = r#"You are a clinical intake assistant. You convert a patient's own description of their symptoms into structured data.

RULES:
- Only report symptoms the patient actually describes. Never infer or add symptoms.
- Use ONLY identifiers from the allowed list. If a complaint has no matching identifier, omit it.
- Copy attribute values from the patient's words. Use null when the patient did not say.
- Do not diagnose. Do not give advice.
- Output a single ```json fenced block and nothing else."#;

/// Build the extraction prompt: allowed vocabulary, output schema, patient text.
pub fn build_extraction_prompt(text: &str, kb: &KnowledgeBase) -> String {
    let vocabulary = kb
        .entries()
        .iter()
        .map(|e| format!("- {} ({})", e.id, e.display_name))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Allowed symptom identifiers:
{vocabulary}

Return JSON with this exact shape:
```json
{{
  "symptoms": [
    {{
      "id": "<identifier from the allowed list>",
      "severity": "<patient's words or null>",
      "duration": "<patient's words or null>",
      "frequency": "<patient's words or null>",
      "triggers": "<patient's words or null>"
    }}
  ]
}}
```
List symptoms in the order the patient mentions them. Return an empty list when no symptom is described.

<patient_text>
{text}
</patient_text>"#
    )
}
