//! HTML views
//!
//! Templates are embedded in the binary. Auto-escaping is on for every
//! template; answers go through the `markdown` filter, which marks its
//! output safe.

use minijinja::{context, Environment, Value};
use pulldown_cmark::{html, Event, Options, Parser};

use crate::models::{Conversation, SessionSummary, Source};
use crate::Result;

pub struct Views {
    env: Environment<'static>,
}

impl Views {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("macros.html", include_str!("../templates/macros.html"))?;
        env.add_template("index.html", include_str!("../templates/index.html"))?;
        env.add_template("chat.html", include_str!("../templates/chat.html"))?;
        env.add_template("conversations.html", include_str!("../templates/conversations.html"))?;
        env.add_template(
            "conversation_item.html",
            include_str!("../templates/conversation_item.html"),
        )?;
        env.add_filter("markdown", markdown);

        Ok(Self { env })
    }

    pub fn index(&self, conversation: &Conversation) -> Result<String> {
        self.render("index.html", context! { conversation => conversation })
    }

    pub fn chat(&self, conversation: &Conversation, sources: &[Source]) -> Result<String> {
        self.render(
            "chat.html",
            context! { conversation => conversation, sources => sources },
        )
    }

    pub fn conversations(&self, chat_history: &[SessionSummary]) -> Result<String> {
        self.render("conversations.html", context! { chat_history => chat_history })
    }

    pub fn conversation_item(&self, item: &SessionSummary) -> Result<String> {
        self.render("conversation_item.html", context! { item => item })
    }

    fn render(&self, name: &str, ctx: Value) -> Result<String> {
        Ok(self.env.get_template(name)?.render(ctx)?)
    }
}

/// Render Markdown text to HTML. Raw HTML in the source is shown as text.
pub fn render_markdown(text: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_TABLES);

    let events = Parser::new_ext(text, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });

    let mut out = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut out, events);
    out
}

fn markdown(text: String) -> Value {
    Value::from_safe_string(render_markdown(&text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Turn;

    #[test]
    fn test_markdown_rendering() {
        let html = render_markdown("**bold** and ~~gone~~\n\n| a | b |\n|---|---|\n| 1 | 2 |");
        assert!(html.contains("<strong>bold</strong>"));
        assert!(html.contains("<del>gone</del>"));
        assert!(html.contains("<table>"));
    }

    #[test]
    fn test_markdown_escapes_raw_html() {
        let html = render_markdown("<script>alert(1)</script>\n\nSee <b onclick=\"x()\">this</b>");
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<b onclick"));
        assert!(html.contains("&lt;b onclick="));
    }

    #[test]
    fn test_chat_escapes_questions_and_renders_answers() {
        let views = Views::new().unwrap();
        let conversation = Conversation::new(
            "c-1",
            "user-1",
            vec![Turn::new("<script>alert(1)</script>", "It is **fine**")],
        );

        let html = views.chat(&conversation, &[]).unwrap();
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>alert(1)</script>"));
        assert!(html.contains("<strong>fine</strong>"));
        assert!(html.contains(r#"name="conversation_id" value="c-1""#));
    }

    #[test]
    fn test_history_views() {
        let views = Views::new().unwrap();
        let item = SessionSummary {
            conversation_id: "c-9".into(),
            initial_question: "How do refunds work?".into(),
            created: "1/5/2024 1:00 PM".into(),
        };

        let html = views.conversations(std::slice::from_ref(&item)).unwrap();
        assert!(html.contains(r#"hx-get="/conversation/c-9""#));
        assert!(html.contains("How do refunds work?"));
        assert!(html.contains("1:00 PM"));

        let empty = views.conversations(&[]).unwrap();
        assert!(empty.contains("No conversations yet"));

        let single = views.conversation_item(&item).unwrap();
        assert!(single.contains("conversation-item"));
    }

    #[test]
    fn test_index_embeds_empty_chat() {
        let views = Views::new().unwrap();
        let html = views.index(&Conversation::empty("user-1")).unwrap();
        assert!(html.contains(r#"id="conversation-list""#));
        assert!(html.contains(r#"name="conversation_id" value="""#));
    }
}
