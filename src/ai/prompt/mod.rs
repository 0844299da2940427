//! Prompt Builder
//!
//! Consistent layout for every stage prompt:
//!
//! 1. **Role**: who the model is for this call
//! 2. **Objectives**: numbered goals
//! 3. **Context**: ordered key/value facts and titled text blocks
//! 4. **Focus**: hard boundaries for the output
//! 5. **Avoid**: constraints fed back from the repetition trackers
//! 6. **Output**: the exact response shape

/// Prompt section types
#[derive(Debug, Clone)]
enum PromptSection {
    Role { expertise: String, task: String },
    Objectives(Vec<String>),
    /// Key/value facts, kept in insertion order
    Context(Vec<(String, String)>),
    Text { header: Option<String>, content: String },
    Focus { target: String, restrictions: Vec<String> },
    Avoid(Vec<String>),
    Output { format: String, schema: Option<String> },
}

#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    sections: Vec<PromptSection>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn role(mut self, expertise: &str, task: &str) -> Self {
        self.sections.push(PromptSection::Role {
            expertise: expertise.to_string(),
            task: task.to_string(),
        });
        self
    }

    pub fn objectives(mut self, objectives: Vec<&str>) -> Self {
        self.sections.push(PromptSection::Objectives(
            objectives.into_iter().map(String::from).collect(),
        ));
        self
    }

    /// Add a context fact, grouping with the previous context section
    pub fn context_item(mut self, key: &str, value: impl AsRef<str>) -> Self {
        let value = value.as_ref().trim();
        if value.is_empty() {
            return self;
        }
        let entry = (key.to_string(), value.to_string());
        match self.sections.last_mut() {
            Some(PromptSection::Context(items)) => items.push(entry),
            _ => self.sections.push(PromptSection::Context(vec![entry])),
        }
        self
    }

    /// Titled block; skipped when `content` is blank
    pub fn section(mut self, header: &str, content: impl AsRef<str>) -> Self {
        let content = content.as_ref().trim();
        if !content.is_empty() {
            self.sections.push(PromptSection::Text {
                header: Some(header.to_string()),
                content: content.to_string(),
            });
        }
        self
    }

    /// Titled block that is only added when `content` is present
    pub fn optional_section(self, header: &str, content: Option<&str>) -> Self {
        match content {
            Some(c) => self.section(header, c),
            None => self,
        }
    }

    pub fn text(mut self, content: &str) -> Self {
        self.sections.push(PromptSection::Text {
            header: None,
            content: content.to_string(),
        });
        self
    }

    pub fn focus(mut self, target: &str, restrictions: Vec<&str>) -> Self {
        self.sections.push(PromptSection::Focus {
            target: target.to_string(),
            restrictions: restrictions.into_iter().map(String::from).collect(),
        });
        self
    }

    /// Constraints block; skipped when empty
    pub fn avoid(mut self, items: Vec<String>) -> Self {
        if !items.is_empty() {
            self.sections.push(PromptSection::Avoid(items));
        }
        self
    }

    /// Request a JSON object with the given example shape
    pub fn json_output(mut self, schema: &str) -> Self {
        self.sections.push(PromptSection::Output {
            format: "Respond with a single JSON object and nothing else. \
                     Do not wrap it in markdown."
                .to_string(),
            schema: Some(schema.trim().to_string()),
        });
        self
    }

    /// Request plain prose
    pub fn prose_output(mut self, instruction: &str) -> Self {
        self.sections.push(PromptSection::Output {
            format: instruction.to_string(),
            schema: None,
        });
        self
    }

    pub fn build(self) -> String {
        let mut prompt = String::new();

        for section in self.sections {
            match section {
                PromptSection::Role { expertise, task } => {
                    prompt.push_str("<ROLE>\n");
                    prompt.push_str(&format!(
                        "You are an expert {} working on {}.\n",
                        expertise, task
                    ));
                    prompt.push_str("</ROLE>\n\n");
                }
                PromptSection::Objectives(objectives) => {
                    prompt.push_str("<OBJECTIVES>\n");
                    for (i, obj) in objectives.iter().enumerate() {
                        prompt.push_str(&format!("{}. {}\n", i + 1, obj));
                    }
                    prompt.push_str("</OBJECTIVES>\n\n");
                }
                PromptSection::Context(items) => {
                    prompt.push_str("# Context\n\n");
                    for (key, value) in items {
                        prompt.push_str(&format!("**{}**: {}\n", key, value));
                    }
                    prompt.push('\n');
                }
                PromptSection::Text { header, content } => {
                    if let Some(h) = header {
                        prompt.push_str(&format!("# {}\n\n", h));
                    }
                    prompt.push_str(&content);
                    prompt.push_str("\n\n");
                }
                PromptSection::Focus {
                    target,
                    restrictions,
                } => {
                    prompt.push_str("<FOCUS>\n");
                    prompt.push_str(&format!("IMPORTANT: Write EXCLUSIVELY: {}\n", target));
                    for restriction in restrictions {
                        prompt.push_str(&format!("- {}\n", restriction));
                    }
                    prompt.push_str("</FOCUS>\n\n");
                }
                PromptSection::Avoid(items) => {
                    prompt.push_str("<AVOID>\n");
                    for item in items {
                        prompt.push_str(&format!("- {}\n", item));
                    }
                    prompt.push_str("</AVOID>\n\n");
                }
                PromptSection::Output { format, schema } => {
                    prompt.push_str("<OUTPUT>\n");
                    prompt.push_str(&format);
                    prompt.push('\n');
                    if let Some(schema) = schema {
                        prompt.push_str(&schema);
                        prompt.push('\n');
                    }
                    prompt.push_str("</OUTPUT>\n\n");
                }
            }
        }

        prompt.trim_end().to_string()
    }
}
