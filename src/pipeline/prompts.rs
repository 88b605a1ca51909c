//! Instruction prompts sent to the extraction backends.
//!
//! Three call shapes share the same adapters and differ only by prompt:
//! field-value extraction, field-schema detection, and arbiter merging.
//! Detection deliberately asks for a bare JSON array instead of the
//! response envelope; the normalizer absorbs the violations models commit
//! against both contracts.

/// Default arbitration guidance when a template carries no custom
/// reconciliation instruction.
pub const DEFAULT_MERGE_GUIDANCE: &str = "\
You are an expert document extraction analyst comparing two AI readings of \
the same document. For every field, prefer the more complete and accurate \
value of the two.";

/// Correction guidance used by the test flow when the template has no
/// custom instruction.
pub const DEFAULT_CORRECTION_INSTRUCTION: &str =
    "Fix any errors and ensure JSON format is correct.";

const MERGE_TASK: &str = "\
Analyze both extractions and create a merged, improved version that takes \
the most accurate parts from each. An empty extraction means that side was \
not run; rely entirely on the other side.";

const MERGE_RESPONSE_SHAPE: &str = "\
Respond with a single JSON object of the form \
{\"mergedText\": \"<the merged extraction>\", \"analysis\": \
{\"sourceAScore\": <0..1>, \"sourceBScore\": <0..1>, \"reasoning\": \"<one sentence>\"}}.";

const EXTRACTION_RESPONSE_SHAPE: &str = "\
Respond with a single JSON object of the form \
{\"text\": \"<the extracted data as a JSON-encoded object>\", \
\"confidence\": <0..1>, \
\"metadata\": {\"contentType\": \"<document kind>\", \"imageQuality\": \"<good|fair|poor>\"}}.";

/// Instruction for extracting field values according to a template's
/// field list (serialized as JSON).
pub fn field_extraction_instruction(fields_json: &str) -> String {
    format!(
        "Extract data from this document according to these form fields:\n\
         {fields_json}\n\n\
         Return a JSON object where keys are the field names and values are \
         the extracted data. Ensure all data types match the field types.\n\n\
         {EXTRACTION_RESPONSE_SHAPE}"
    )
}

/// Instruction asking a backend to infer the form-field schema visible in
/// an example image. The top-level response must be an array, not an
/// object wrapping an array.
pub const FIELD_DETECTION_INSTRUCTION: &str = "\
Analyze this document image and identify all form fields.

IMPORTANT: Respond with ONLY a JSON array of field objects - no additional \
text or explanation. Do NOT wrap the array in another object. The response \
must start with '[' and end with ']'.

For each field, include these properties:
- name: camelCase identifier
- label: Human-readable field label
- fieldType: one of [text, number, date, email, tel, checkbox, radio, select, textarea]
- required: boolean whether field appears required
- options: array of option values for select/radio/checkbox
- defaultValue: any detected default value
- placeholder: detected placeholder text
- order: position in the form (1-based)

Example response format (just this array, nothing else):
[
  {
    \"name\": \"fullName\",
    \"label\": \"Full Name\",
    \"fieldType\": \"text\",
    \"required\": true,
    \"options\": null,
    \"defaultValue\": \"\",
    \"placeholder\": \"Enter your full name\",
    \"order\": 1
  }
]";

/// Arbitration guidance for merging two candidate field arrays.
pub const FIELD_MERGE_INSTRUCTION: &str = "\
Analyze both field detection results and create an accurate JSON array of \
form fields. Fix any field type errors or name inconsistencies.

EXTREMELY IMPORTANT:
1. Return ONLY a valid JSON array starting with [ and ending with ]
2. Do NOT wrap the array in another JSON object with properties
3. The array should directly contain field objects
4. NO explanatory text before or after the JSON

Example of correct response format:
[{\"name\":\"field1\",\"label\":\"Field 1\",\"fieldType\":\"text\",\"required\":true}]";

/// Build the arbiter prompt embedding both sides' extracted text.
///
/// `side_a` is always the gemini reading and `side_b` the openai reading;
/// either may be empty when that side was not run.
pub fn merge_prompt(side_a: &str, side_b: &str, custom: Option<&str>) -> String {
    let guidance = match custom {
        Some(c) if !c.trim().is_empty() => c,
        _ => DEFAULT_MERGE_GUIDANCE,
    };
    format!(
        "{guidance}\n\n\
         Here are two extractions of the same document:\n\n\
         Extraction 1 (Gemini):\n{side_a}\n\n\
         Extraction 2 (GPT):\n{side_b}\n\n\
         {MERGE_TASK}\n\n\
         {MERGE_RESPONSE_SHAPE}"
    )
}
