//! Prompt text and structured-output schemas for the three LLM call shapes.

use serde_json::{json, Value};

use crate::models::{FINDING_FIELDS, METRIC_FIELDS};

// ═══════════════════════════════════════════════════════════
// Intent classification (free text)
// ═══════════════════════════════════════════════════════════

pub const INTENT_SYSTEM_PROMPT: &str = "\
Classify the user input into one of these categories:
- NLI_EDIT: a plain-language editing instruction (e.g. \"Change source to FDA\")
- FORM_EDIT_STRUCTURED: JSON or structured form data
- FORM_EDIT_RAW: raw text with toxicity data that needs extraction (NOAEL values, study data)
- NO_EDIT: a question or any request that does not change the record

Respond with ONLY the category name.";

// ═══════════════════════════════════════════════════════════
// Patch generation (structured)
// ═══════════════════════════════════════════════════════════

pub const PATCH_SYSTEM_PROMPT: &str = r#"You generate ONE JSON Patch operation that edits a cosmetic-ingredient toxicology record.

Record layout:
- "inci": ingredient INCI name; "cas": array of CAS numbers; "isSkip": boolean; "category": string
- finding arrays: acute_toxicity, skin_irritation, skin_sensitization, ocular_irritation,
  phototoxicity, repeated_dose_toxicity, percutaneous_absorption, ingredient_profile.
  Each entry: {"reference": {"title", "link"}, "data": [strings], "source", "statement",
  "replaced": {"replaced_inci", "replaced_type"}}
- metric arrays: "NOAEL", "DAP". Each entry: {"note", "unit", "experiment_target", "source",
  "type", "study_duration", "value"}
- "inci_ori": original INCI name

Paths:
- "/<field>/-" appends to an array, "/<field>/<index>" targets one element
- scalar fields are addressed directly: "/inci", "/category", "/isSkip", "/cas"

Rules:
1. Exactly one operation with keys op ("add" | "remove" | "replace"), path and value.
2. add and replace need a value; remove takes none.
3. A value added to a finding array is a complete entry with all five keys.
4. A value added to NOAEL or DAP is a number or a complete metric entry.
5. Copy values exactly as the user states them.

Examples:
"Set NOAEL to 100 mg/kg" -> {"op": "add", "path": "/NOAEL/-", "value": {"note": null, "unit": "mg/kg", "experiment_target": null, "source": "", "type": "NOAEL", "study_duration": null, "value": 100}}
"Update INCI name to Sodium Lauryl Sulfate" -> {"op": "replace", "path": "/inci", "value": "Sodium Lauryl Sulfate"}
"Delete the first DAP entry" -> {"op": "remove", "path": "/DAP/0", "value": null}"#;

/// User prompt for patch generation.
pub fn build_patch_prompt(document: &Value, instruction: &str, inci: &str) -> String {
    let doc = serde_json::to_string_pretty(document).unwrap_or_default();
    format!(
        "Current JSON:\n{doc}\n\n\
         Current INCI: {inci}\n\n\
         Available finding fields: {findings}\n\
         Available metric fields: {metrics}\n\n\
         User instruction: \"{instruction}\"\n\n\
         Generate the JSON Patch operation:",
        findings = FINDING_FIELDS.join(", "),
        metrics = METRIC_FIELDS.join(", "),
    )
}

/// Schema constraining patch generation to `{op, path, value}`.
pub fn patch_operation_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "op": {"type": "string", "enum": ["add", "remove", "replace"]},
            "path": {"type": "string"},
            "value": {}
        },
        "required": ["op", "path"]
    })
}

// ═══════════════════════════════════════════════════════════
// Full-document fallback (free text)
// ═══════════════════════════════════════════════════════════

pub const FALLBACK_SYSTEM_PROMPT: &str =
    "You are a toxicology data specialist for cosmetic ingredients. You reply with JSON only.";

/// Prompt asking for only the changed top-level fields.
///
/// Placeholder values in the templates are written as `{{...}}` so a model
/// that copies them produces output the merge step will not mistake for data.
pub fn build_fallback_prompt(document: &Value, instruction: &str, inci: &str) -> String {
    let doc = serde_json::to_string_pretty(document).unwrap_or_default();
    format!(
        r#"Update the toxicology JSON for INCI: {inci}

Current JSON:
{doc}

==================== USER INSTRUCTION FOR {inci} ====================
{instruction}
=====================================================================

Modification types:
- Finding addition: return the new entry inside its finding array
  (reference, data, source, statement, replaced).
- NOAEL update: return "NOAEL" and the supporting "repeated_dose_toxicity" entry.
- DAP update: return "DAP" and the supporting "percutaneous_absorption" entry.

Rules:
1. Return ONLY the top-level fields that change, never the whole document.
2. Use lowercase "inci", never "INCI".
3. No "..." placeholders; every returned entry is complete.
4. Every value comes from the instruction. A sub-field the instruction does not mention is null.
5. Never copy values from the templates below; they are shapes, not data.
6. Valid JSON only, no commentary.

NOAEL template:
{{
  "inci": "{inci}",
  "NOAEL": [{{"note": {{{{NOTE_OR_NULL}}}}, "unit": "{{{{UNIT}}}}", "experiment_target": {{{{TARGET_OR_NULL}}}},
             "source": "{{{{SOURCE_LOWERCASE}}}}", "type": "NOAEL", "study_duration": {{{{DURATION_OR_NULL}}}},
             "value": {{{{NUMBER}}}}}}],
  "repeated_dose_toxicity": [{{"reference": {{"title": "{{{{TITLE}}}}", "link": {{{{URL_OR_NULL}}}}}},
                              "data": ["{{{{FINDING_SENTENCE}}}}"], "source": "{{{{SAME_SOURCE}}}}",
                              "statement": "{{{{SUMMARY}}}}",
                              "replaced": {{"replaced_inci": "", "replaced_type": ""}}}}]
}}

DAP template:
{{
  "inci": "{inci}",
  "DAP": [{{"note": {{{{REASONING_OR_NULL}}}}, "unit": "%", "experiment_target": {{{{TARGET_OR_NULL}}}},
           "source": "{{{{SOURCE_LOWERCASE}}}}", "type": "DAP", "study_duration": {{{{DURATION_OR_NULL}}}},
           "value": {{{{NUMBER}}}}}}],
  "percutaneous_absorption": [{{"reference": {{"title": "{{{{TITLE}}}}", "link": {{{{URL_OR_NULL}}}}}},
                               "data": ["{{{{FINDING_SENTENCE}}}}"], "source": "{{{{SAME_SOURCE}}}}",
                               "statement": "{{{{SUMMARY}}}}",
                               "replaced": {{"replaced_inci": "", "replaced_type": ""}}}}]
}}

Example: "Set NOAEL to 250 mg/kg bw/day from WHO report" gives experiment_target null and
study_duration null because the instruction names neither.

Return ONLY the changed fields for {inci} as JSON:"#
    )
}

// ═══════════════════════════════════════════════════════════
// Correction-form extraction (structured)
// ═══════════════════════════════════════════════════════════

pub const EXTRACTION_SYSTEM_PROMPT: &str = "\
You read toxicology correction forms for cosmetic ingredients and extract the values they \
state. Numbers are returned without units. Source names are short agency or publisher names \
(CIR, ECHA, OECD, SCCS, expert).";

pub fn build_task_classification_prompt(form_text: &str) -> String {
    format!(
        "Decide which data this correction form carries.\n\
         task_type is \"noael\" for NOAEL / repeated dose toxicity data, \"dap\" for dermal \
         absorption (DAP / percutaneous absorption) data, \"both\" when both are present, \
         \"unknown\" otherwise. Include the INCI name if the form names one.\n\n\
         Correction form:\n{form_text}"
    )
}

pub fn build_noael_extraction_prompt(form_text: &str) -> String {
    format!(
        "Extract the NOAEL determination from this correction form. Use unit \"mg/kg bw/day\", \
         experiment_target \"Rats\" and study_duration \"90-day\" when the form does not say.\n\n\
         Correction form:\n{form_text}"
    )
}

pub fn build_dap_extraction_prompt(form_text: &str) -> String {
    format!(
        "Extract the dermal absorption percentage (DAP) from this correction form. Use \
         experiment_target \"Human skin\" and study_duration \"theoretical\" when the form \
         does not say.\n\n\
         Correction form:\n{form_text}"
    )
}

pub fn task_classification_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "task_type": {"type": "string", "enum": ["noael", "dap", "both", "unknown"]},
            "has_noael_data": {"type": "boolean"},
            "has_dap_data": {"type": "boolean"},
            "inci_name": {"type": ["string", "null"]}
        },
        "required": ["task_type", "has_noael_data", "has_dap_data"]
    })
}

/// Schema shared by NOAEL and DAP extraction; both fill the same payload shape.
pub fn metric_extraction_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "inci_name": {"type": "string"},
            "value": {"type": "number"},
            "unit": {"type": "string"},
            "experiment_target": {"type": "string"},
            "source": {"type": "string"},
            "study_duration": {"type": "string"},
            "note": {"type": "string"},
            "reference_title": {"type": "string"},
            "reference_link": {"type": ["string", "null"]},
            "statement": {"type": "string"}
        },
        "required": ["inci_name", "value", "source", "reference_title"]
    })
}
