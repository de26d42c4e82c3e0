//! Prompt builder: citation-style RAG template, GeoGPT persona fallback,
//! context windows and `<thinking>` parsing.

/// Citation-style template used whenever retrieval produced context.
///
/// Placeholders: `{search_results}`, `{cur_date}`, `{question}`.
pub const RAG_PROMPT: &str = "# The following contents are the search results related to the user's message:
{search_results}
In the search results I provide to you, each result is formatted as [document X begin]...[document X end], where X represents the numerical index of each article. Please cite the context at the end of the relevant sentence when appropriate. Use the citation format [citation:X] in the corresponding part of your answer. If a sentence is derived from multiple contexts, list all relevant citation numbers, such as [citation:3][citation:5]. Be sure not to cluster all citations at the end; instead, include them in the corresponding parts of the answer.
When responding, please keep the following points in mind:
- Today is {cur_date}.
- Not all content in the search results is closely related to the user's question. You need to evaluate and filter the search results based on the question.
- If all the search results are irrelevant, please answer the question by yourself professionally and concisely.
- The search results may focus only on a few points, use the information it provided, but do not favor those points in your answer, reason and answer by yourself all-sidedly with full consideration.
- For listing-type questions (e.g., listing all flight information), try to limit the answer to 10 key points and inform the user that they can refer to the search sources for complete information. Prioritize providing the most complete and relevant items in the list. Avoid mentioning content not provided in the search results unless necessary.
- For creative tasks (e.g., writing an essay), ensure that references are cited within the body of the text, such as [citation:3][citation:5], rather than only at the end of the text. You need to interpret and summarize the user's requirements, choose an appropriate format, fully utilize the search results, extract key information, and generate an answer that is insightful, creative, and professional. Extend the length of your response as much as possible, addressing each point in detail and from multiple perspectives, ensuring the content is rich and thorough.
- If the response is lengthy, structure it well and summarize it in paragraphs. If a point-by-point format is needed, try to limit it to 5 points and merge related content.
- For objective Q&A, if the answer is very brief, you may add one or two related sentences to enrich the content.
- Choose an appropriate and visually appealing format for your response based on the user's requirements and the content of the answer, ensuring strong readability.
- Your answer should synthesize information from multiple relevant documents and avoid repeatedly citing the same document.
- Unless the user requests otherwise, your response should be in the same language as the user's question.
# The user's message is:
{question}";

/// Prepended when the caller wants the reasoning trace back.
pub const THINKING_INSTRUCTION: &str = "
Please think through this step by step before providing your final answer. Structure your response as:

<thinking>
[Your detailed reasoning process here]
</thinking>

[Your final response here]

";

/// Markup allowance charged per chunk against the context budget.
const CHUNK_MARKUP_CHARS: usize = 50;

const EXCERPT_CHARS: usize = 300;

/// Joins chunks as numbered `[document i begin]…[document i end]` blocks.
///
/// Chunks are taken in order and the window stops at the first chunk that
/// would push the running length (text plus markup allowance) past
/// `max_chars`.
///
/// # Example
/// ```
/// use contextor::prompt::build_context;
/// let ctx = build_context(&["alpha".to_string()], 4000);
/// assert_eq!(ctx, "[document 1 begin]\nalpha\n[document 1 end]\n\n");
/// ```
pub fn build_context(chunks: &[String], max_chars: usize) -> String {
    let mut out = String::new();
    let mut used = 0usize;

    for (i, chunk) in chunks.iter().enumerate() {
        let len = chunk.chars().count();
        if used + len > max_chars {
            break;
        }
        let n = i + 1;
        out.push_str(&format!("[document {n} begin]\n{chunk}\n[document {n} end]\n\n"));
        used += len + CHUNK_MARKUP_CHARS;
    }

    out
}

/// Builds the final prompt for one question.
///
/// Non-empty context uses [`RAG_PROMPT`]; otherwise the GeoGPT persona
/// prompt. `cur_date` is rendered verbatim (callers pass `YYYY-MM-DD`).
pub fn build_rag_prompt(
    question: &str,
    context: &str,
    include_thinking: bool,
    cur_date: &str,
) -> String {
    let thinking = if include_thinking {
        THINKING_INSTRUCTION
    } else {
        ""
    };

    let prompt = if context.trim().is_empty() {
        format!(
            "You are GeoGPT, an AI assistant specialized in geospatial analysis and GIS workflows.\n\n\
             Today is {cur_date}.\n\n\
             User Question: {question}\n\n\
             Please provide a comprehensive response based on your geospatial expertise."
        )
    } else {
        RAG_PROMPT
            .replace("{search_results}", context)
            .replace("{cur_date}", cur_date)
            .replace("{question}", question)
    };

    format!("{thinking}{prompt}")
}

/// Splits `<thinking>…</thinking>` from the answer.
///
/// Returns `(None, raw)` unchanged when thinking was not requested or the
/// block is missing or unterminated.
pub fn parse_thinking(raw: &str, include_thinking: bool) -> (Option<String>, String) {
    if !include_thinking {
        return (None, raw.to_string());
    }
    let Some(open) = raw.find("<thinking>") else {
        return (None, raw.to_string());
    };
    let after_open = &raw[open + "<thinking>".len()..];
    match after_open.find("</thinking>") {
        Some(close) => {
            let thinking = after_open[..close].trim().to_string();
            let answer = after_open[close + "</thinking>".len()..].trim().to_string();
            (Some(thinking), answer)
        }
        None => (None, raw.to_string()),
    }
}

/// Rough token estimate: four characters per token.
pub fn estimate_tokens(text: &str) -> u32 {
    (text.chars().count() / 4) as u32
}

/// First 300 characters, with `...` appended when something was cut.
pub fn excerpt(text: &str) -> String {
    if text.chars().count() > EXCERPT_CHARS {
        format!("{}...", truncate_chars(text, EXCERPT_CHARS))
    } else {
        text.to_string()
    }
}

/// Prefix of at most `max` characters, never splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
