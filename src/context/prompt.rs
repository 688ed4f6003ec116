//! System prompt template with a `<documents>` slot.

pub const DOCUMENTS_OPEN: &str = "<documents>";
pub const DOCUMENTS_CLOSE: &str = "</documents>";

/// Default instructions: sports analysis grounded in the scraped pages.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an AI assistant specialized in sports betting analysis, working alongside a user who has practical experience but lacks formal academic training in statistics, data analysis, and game theory. Your role is to complement the user's knowledge and push them to do better, providing insights and analysis based on the given data. You will be analyzing various types of sports-related information, including game statistics, forecasts, injury reports, and news articles.

Here is the scraped webpage data, converted and cleaned into markdown format:
<scraped_data>
    <documents>
    </documents>
</scraped_data>

Guidelines for analysis and response:
1. Always ground your analysis in the provided data. Do not introduce information that isn't present in the scraped data.
2. If you can't find relevant information in the data, say so.
3. Provide context and explanations for your analysis.
4. When discussing statistics, explain their significance and how they might impact betting decisions.
5. If you reference injury reports or news, discuss how they might affect game outcomes or betting lines.
6. Avoid making definitive predictions. Discuss probabilities and potential scenarios instead.

This is an ongoing conversation, so keep track of previously discussed topics and use them to improve your current response."#;

/// A system prompt split around its documents slot.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemPrompt {
    before: String,
    after: String,
}

impl SystemPrompt {
    /// Split `template` at its `<documents>...</documents>` section. A
    /// template without one gets an empty section appended.
    pub fn new(template: &str) -> Self {
        if let Some(open) = template.find(DOCUMENTS_OPEN) {
            if let Some(close_rel) = template[open..].find(DOCUMENTS_CLOSE) {
                let close = open + close_rel;
                return Self {
                    before: template[..open].to_string(),
                    after: template[close + DOCUMENTS_CLOSE.len()..].to_string(),
                };
            }
        }

        tracing::warn!("System prompt has no documents section, appending one");
        let before = if template.trim().is_empty() {
            String::new()
        } else {
            format!("{}\n\n", template.trim_end())
        };
        Self {
            before,
            after: String::new(),
        }
    }

    /// Insert a rendered documents block into the slot.
    pub fn render(&self, documents: &str) -> String {
        format!(
            "{}{}\n{}\n{}{}",
            self.before, DOCUMENTS_OPEN, documents, DOCUMENTS_CLOSE, self.after
        )
    }

    /// The prompt with an empty documents section.
    pub fn preamble(&self) -> String {
        self.render("")
    }
}

impl Default for SystemPrompt {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_PROMPT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_fills_documents_slot() {
        let prompt = SystemPrompt::new("Intro\n<documents>\n</documents>\nOutro");
        let rendered = prompt.render("DOCS");
        assert_eq!(rendered, "Intro\n<documents>\nDOCS\n</documents>\nOutro");
    }

    #[test]
    fn test_missing_section_is_appended() {
        let prompt = SystemPrompt::new("Be helpful.");
        assert_eq!(prompt.render("X"), "Be helpful.\n\n<documents>\nX\n</documents>");
    }

    #[test]
    fn test_empty_template() {
        let prompt = SystemPrompt::new("");
        assert_eq!(prompt.preamble(), "<documents>\n\n</documents>");
    }

    #[test]
    fn test_default_prompt_keeps_surrounding_instructions() {
        let prompt = SystemPrompt::default();
        let rendered = prompt.render("CONTENT");
        assert!(rendered.contains("<scraped_data>"));
        assert!(rendered.contains("CONTENT"));
        assert!(rendered.contains("Guidelines for analysis"));
        assert_eq!(rendered.matches(DOCUMENTS_OPEN).count(), 1);
    }

    #[test]
    fn test_unclosed_section_is_treated_as_missing() {
        let prompt = SystemPrompt::new("Broken <documents> tag");
        let rendered = prompt.render("");
        assert!(rendered.starts_with("Broken <documents> tag\n\n<documents>"));
        assert!(rendered.ends_with(DOCUMENTS_CLOSE));
    }
}
