//! Fixed prompts for privacy classification.

/// System prompt describing the categories, risk levels and reply shape.
pub const PRIVACY_SYSTEM_PROMPT: &str = r#"You are an expert privacy and security analyst specializing in detecting sensitive information.

Analyze the supplied text and identify any personal, confidential, or sensitive information that could pose privacy or security risks.

CATEGORIES TO DETECT:

1. Personal Identifiers: full names, postal addresses, phone numbers, email addresses, date of birth, age, gender, nationality, identifiable physical descriptions.
2. Government/Official IDs: social security numbers, tax IDs, passport and visa numbers, driver's license numbers, student or employee IDs, national ID numbers.
3. Financial Information: credit/debit card numbers, bank account numbers, IBAN or SWIFT codes, transaction details, salary or income, financial statements.
4. Authentication Credentials: usernames and passwords, API keys, tokens, access codes, security questions and answers, two-factor codes, PINs.
5. Medical/Health Information: medical records and diagnoses, prescriptions, health insurance details, test results, mental health information.
6. Biometric Data: fingerprints, facial recognition data, retinal scans, DNA information, identifying voice recordings.
7. Confidential/Proprietary: trade secrets, business plans, confidential communications, internal documents, proprietary algorithms or code, non-public business information.

RISK LEVELS:
- critical: immediate security threat (passwords, SSN, credit cards)
- high: serious privacy concern (passport, medical records, financial data)
- medium: moderate risk (full name plus address, employee ID)
- low: minor concern (first name only, generic email)
- none: no sensitive information detected

RESPONSE FORMAT (JSON only, no markdown):
{
    "contains_sensitive_info": true or false,
    "risk_level": "none/low/medium/high/critical",
    "detected_categories": ["category1", "category2"],
    "specific_findings": ["finding1", "finding2"],
    "recommendations": ["action1", "action2"],
    "confidence": "high/medium/low"
}

Be thorough but precise. Only flag actual sensitive information, not generic content."#;

/// Build the user prompt for one document.
pub fn user_prompt(text: &str, file_name: &str, context: &str) -> String {
    let mut header = Vec::with_capacity(2);
    if !file_name.is_empty() {
        header.push(format!("Filename: {file_name}"));
    }
    if !context.is_empty() {
        header.push(format!("Context: {context}"));
    }
    let header = if header.is_empty() {
        "Source: Image OCR extraction".to_string()
    } else {
        header.join("\n")
    };

    format!(
        "{header}\n\nTEXT TO ANALYZE:\n{text}\n\nAnalyze the above text for sensitive information and respond with ONLY valid JSON in the specified format."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_prompt_carries_file_and_context() {
        let prompt = user_prompt("card 4111", "notes.txt", "Native text file");
        assert!(prompt.starts_with("Filename: notes.txt\nContext: Native text file\n\n"));
        assert!(prompt.contains("TEXT TO ANALYZE:\ncard 4111\n"));
    }

    #[test]
    fn user_prompt_defaults_source_line() {
        let prompt = user_prompt("text", "", "");
        assert!(prompt.starts_with("Source: Image OCR extraction"));
    }
}
