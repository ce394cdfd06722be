// src/ai/prompt.rs

/// Role given to the model ahead of every question.
pub const INSTRUCTION: &str = "You are an expert in understanding invoices. \
You will receive input images as invoices and you will have to answer questions based on the input image.";

/// Joins the instruction and the user's question.
pub const QUESTION_SEPARATOR: &str = " Question: ";

/// Build the prompt sent to the model. The question is passed through as-is.
pub fn compose(question: &str) -> String {
    let mut prompt = String::with_capacity(INSTRUCTION.len() + QUESTION_SEPARATOR.len() + question.len());
    prompt.push_str(INSTRUCTION);
    prompt.push_str(QUESTION_SEPARATOR);
    prompt.push_str(question);
    prompt
}
