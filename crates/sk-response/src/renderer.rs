//! Stage 5: attach structured-embed metadata and emit ordered platform
//! payloads.

use chrono::Utc;

use crate::classifier::Class;
use crate::formatter::Embed;

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEmbed {
    pub title: Option<String>,
    pub description: String,
    pub fields: Vec<(String, String, bool)>,
    pub footer: Option<String>,
    pub colour: u32,
    pub timestamp_rfc3339: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Embed(RenderedEmbed),
}

fn colour_for(class: Class) -> u32 {
    match class {
        Class::Error => 0xE74C3C,
        Class::SearchResults | Class::NewsResults | Class::LocalResults | Class::ImageResults => 0x3498DB,
        Class::DataTable => 0x2ECC71,
        Class::Schedule => 0x9B59B6,
        _ => 0x95A5A6,
    }
}

pub fn render_embed(class: Class, embed: Embed) -> RenderedEmbed {
    RenderedEmbed {
        title: embed.title,
        description: embed.description,
        fields: embed.fields,
        footer: embed.footer,
        colour: colour_for(class),
        timestamp_rfc3339: Utc::now().to_rfc3339(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_embeds_render_in_red() {
        let embed = Embed { title: None, description: "x".into(), fields: vec![], footer: None };
        let rendered = render_embed(Class::Error, embed);
        assert_eq!(rendered.colour, 0xE74C3C);
    }
}
