//! Prompts for the LLM-backed discovery steps.

pub fn query_analysis(query: &str) -> String {
    format!(
        "Analyze this geospatial research query and create a comprehensive analysis plan:

Query: {query}

Please provide:
1. Key geospatial concepts and terms identified
2. Specific geographic locations or regions mentioned
3. Type of spatial analysis required (if any)
4. Relevant data sources that should be consulted
5. Potential GIS tools or methods applicable
6. Research approach and methodology recommendations

Provide a structured analysis that will guide the subsequent discovery steps."
    )
}

pub fn search_terms(analysis: &str, query: &str) -> String {
    format!(
        "From this analysis: {analysis}

Extract 3-5 key search terms that would be most effective for finding relevant information about: {query}

Return only the search terms, separated by commas."
    )
}

pub fn cross_reference(query: &str, summaries: &[String]) -> String {
    format!(
        "Perform a cross-reference analysis of these sources related to: {query}

Sources:
{}

Analyze:
1. Common themes and patterns across sources
2. Contradictions or conflicting information
3. Information gaps or missing perspectives
4. Reliability assessment of different source types
5. Key insights emerging from the combined sources

Provide a comprehensive cross-reference analysis.",
        summaries.join("\n")
    )
}

pub fn report(query: &str, findings: &[String], source_count: usize) -> String {
    format!(
        "Generate a comprehensive geospatial research report for this query: {query}

Based on the following discovery process findings:
{}

Available sources: {source_count} documents from knowledge base, web search, and analysis

Create a detailed report that includes:
1. Executive Summary
2. Key Findings
3. Geospatial Analysis and Insights
4. Data Sources and Methodology
5. Limitations and Considerations
6. Recommendations for Further Research
7. Conclusion

Format the report professionally with clear sections and supporting evidence from the sources.",
        findings.join("\n")
    )
}

/// Splits the comma-separated LLM reply into at most five clean terms.
pub fn parse_search_terms(reply: &str) -> Vec<String> {
    reply
        .split([',', '\n'])
        .map(|t| t.trim().trim_matches(|c: char| c == '"' || c == '\'' || c == '.').trim())
        .filter(|t| !t.is_empty())
        .take(5)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_terms_are_trimmed_and_capped() {
        let terms = parse_search_terms(" \"sea level rise\", coastal erosion ,, GIS, LiDAR, DEM, extra.");
        assert_eq!(
            terms,
            vec!["sea level rise", "coastal erosion", "GIS", "LiDAR", "DEM"]
        );
        assert!(parse_search_terms("  ").is_empty());
    }

    #[test]
    fn prompts_embed_their_inputs() {
        assert!(query_analysis("flood risk in Jakarta").contains("Query: flood risk in Jakarta"));
        let p = cross_reference("q", &["Source 1 (analysis): a".into(), "Source 2 (web_search): b".into()]);
        assert!(p.contains("Source 1 (analysis): a\nSource 2 (web_search): b"));
        assert!(report("q", &[], 7).contains("Available sources: 7 documents"));
    }
}
