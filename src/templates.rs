use handlebars::Handlebars;
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::store::ReviewReport;
use crate::upload::{FormErrors, LANGUAGE_HINT_HELP, MAX_LANGUAGE_HINT_CHARS};

static PAGE_REGISTRY: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("upload", include_str!("templates/upload.hbs"));
    m.insert("report", include_str!("templates/report.hbs"));
    m.insert("admin_reports", include_str!("templates/admin_reports.hbs"));
    m.insert("error", include_str!("templates/error.hbs"));
    m
});

const PARTIALS: &[(&str, &str)] = &[
    ("header", include_str!("templates/header.hbs")),
    ("footer", include_str!("templates/footer.hbs")),
];

/// Render a page by name. Output is HTML-escaped by Handlebars.
pub fn render(name: &str, ctx: &Value) -> anyhow::Result<String> {
    let template = PAGE_REGISTRY
        .get(name)
        .ok_or_else(|| anyhow::anyhow!("unknown page '{name}'"))?;

    let mut hb = Handlebars::new();
    hb.set_strict_mode(true);
    for (partial, source) in PARTIALS {
        hb.register_partial(partial, *source)
            .map_err(|e| anyhow::anyhow!("registering partial '{partial}' failed: {e}"))?;
    }

    hb.render_template(template, ctx)
        .map_err(|e| anyhow::anyhow!("rendering page '{name}' failed: {e}"))
}

pub fn upload_page(errors: &FormErrors, language_hint: &str) -> anyhow::Result<String> {
    render(
        "upload",
        &json!({
            "title": "Upload",
            "errors": errors,
            "language_hint": language_hint,
            "help": LANGUAGE_HINT_HELP,
            "max_hint_chars": MAX_LANGUAGE_HINT_CHARS,
        }),
    )
}

pub fn report_page(report: &ReviewReport) -> anyhow::Result<String> {
    render(
        "report",
        &json!({
            "title": report.filename,
            "report": report,
            "created": report.created_at.format("%Y-%m-%d %H:%M").to_string(),
        }),
    )
}

pub fn admin_reports_page(reports: &[ReviewReport]) -> anyhow::Result<String> {
    let rows: Vec<Value> = reports
        .iter()
        .map(|r| {
            json!({
                "id": r.id,
                "filename": r.filename,
                "created": r.created_at.format("%Y-%m-%d %H:%M").to_string(),
            })
        })
        .collect();

    render(
        "admin_reports",
        &json!({
            "title": "Reports",
            "count": rows.len(),
            "reports": rows,
        }),
    )
}

pub fn error_page(title: &str, message: &str) -> anyhow::Result<String> {
    render("error", &json!({ "title": title, "message": message }))
}
