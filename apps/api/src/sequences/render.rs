use std::collections::HashMap;

/// Placeholder values for one recipient.
#[derive(Debug, Clone, Default)]
pub struct TemplateVars {
    pub full_name: String,
    pub company: Option<String>,
    pub title: Option<String>,
    pub sender_name: Option<String>,
    pub sender_company: Option<String>,
    pub signature: Option<String>,
}

impl TemplateVars {
    fn as_map(&self) -> HashMap<&'static str, String> {
        let first_name = self
            .full_name
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string();
        let mut vars = HashMap::new();
        vars.insert("first_name", first_name);
        vars.insert("full_name", self.full_name.clone());
        vars.insert("company", self.company.clone().unwrap_or_default());
        vars.insert("title", self.title.clone().unwrap_or_default());
        vars.insert("sender_name", self.sender_name.clone().unwrap_or_default());
        vars.insert(
            "sender_company",
            self.sender_company.clone().unwrap_or_default(),
        );
        vars.insert("signature", self.signature.clone().unwrap_or_default());
        vars
    }
}

/// Replaces `{{name}}` placeholders. Unknown placeholders are kept as written.
pub fn render(text: &str, vars: &TemplateVars) -> String {
    let values = vars.as_map();
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        let Some(close) = after_open.find("}}") else {
            out.push_str(&rest[open..]);
            return out;
        };
        let key = after_open[..close].trim();
        match values.get(key) {
            Some(value) => out.push_str(value),
            None => out.push_str(&rest[open..open + 2 + close + 2]),
        }
        rest = &after_open[close + 2..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> TemplateVars {
        TemplateVars {
            full_name: "Grace Brewster Hopper".to_string(),
            company: Some("Navy Labs".to_string()),
            title: Some("Rear Admiral".to_string()),
            sender_name: Some("Sam".to_string()),
            sender_company: Some("Scoutline".to_string()),
            signature: None,
        }
    }

    #[test]
    fn test_renders_known_placeholders() {
        let out = render(
            "Hi {{first_name}}, loved your work at {{ company }} as {{title}}. - {{sender_name}}, {{sender_company}}",
            &vars(),
        );
        assert_eq!(
            out,
            "Hi Grace, loved your work at Navy Labs as Rear Admiral. - Sam, Scoutline"
        );
    }

    #[test]
    fn test_unknown_placeholder_is_kept() {
        assert_eq!(render("Hello {{nickname}}!", &vars()), "Hello {{nickname}}!");
    }

    #[test]
    fn test_missing_values_render_empty() {
        assert_eq!(render("Cheers{{signature}}", &vars()), "Cheers");
    }

    #[test]
    fn test_unterminated_placeholder_is_left_alone() {
        assert_eq!(render("Hi {{first_name", &vars()), "Hi {{first_name");
    }

    #[test]
    fn test_text_without_placeholders_is_unchanged() {
        assert_eq!(render("Plain body", &vars()), "Plain body");
    }
}
