//! Server-side HTML views, compiled into the binary.

use tera::{Context, Tera};

use crate::errors::AppResult;

const TEMPLATES: [(&str, &str); 12] = [
    ("base.html", include_str!("../../templates/base.html")),
    ("login.html", include_str!("../../templates/login.html")),
    ("analysts/list.html", include_str!("../../templates/analysts/list.html")),
    ("analysts/edit.html", include_str!("../../templates/analysts/edit.html")),
    ("analysts/desks.html", include_str!("../../templates/analysts/desks.html")),
    ("notes/edit.html", include_str!("../../templates/notes/edit.html")),
    ("users/list.html", include_str!("../../templates/users/list.html")),
    ("users/edit.html", include_str!("../../templates/users/edit.html")),
    ("users/password.html", include_str!("../../templates/users/password.html")),
    ("groups/list.html", include_str!("../../templates/groups/list.html")),
    ("groups/edit.html", include_str!("../../templates/groups/edit.html")),
    ("lookups.html", include_str!("../../templates/lookups.html")),
];

pub struct Templates {
    tera: Tera,
}

impl Templates {
    pub fn load() -> AppResult<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(TEMPLATES.to_vec())?;
        tera.autoescape_on(vec![".html"]);
        Ok(Self { tera })
    }

    pub fn render(&self, name: &str, context: &Context) -> AppResult<String> {
        Ok(self.tera.render(name, context)?)
    }
}

#[cfg(test)]
mod tests {
    use super::Templates;
    use serde_json::json;
    use tera::Context;

    #[test]
    fn every_template_compiles() {
        Templates::load().expect("templates");
    }

    #[test]
    fn login_page_shows_flash_messages() {
        let templates = Templates::load().expect("templates");
        let mut context = Context::new();
        context.insert("flashes", &json!([{ "kind": "info", "message": "You have signed out." }]));
        context.insert("principal", &serde_json::Value::Null);
        let html = templates.render("login.html", &context).expect("render");
        assert!(html.contains("You have signed out."));
        assert!(html.contains("name=\"username\""));
    }
}
