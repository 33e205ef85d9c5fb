//! `kiln resolve`: Resolve a type reference and print it.

use futures::executor::block_on;
use kiln_runtime::TypeSummary;

use super::Context;
use crate::output::StyledOutput;

pub fn execute(ctx: &Context, out: &mut StyledOutput, reference: &str, json: bool) -> anyhow::Result<()> {
    let session = ctx.session()?;
    let ty = if ctx.use_async {
        block_on(session.resolve_async(reference))?
    } else {
        session.resolve(reference)?
    };
    let summary = session.describe(&ty);

    if json {
        out.plain(&serde_json::to_string_pretty(&summary)?);
        out.newline();
    } else {
        print_summary(out, &summary);
    }
    Ok(())
}

fn print_summary(out: &mut StyledOutput, summary: &TypeSummary) {
    out.heading(&summary.name);
    if summary.is_abstract {
        out.warning(" (abstract)");
    }
    out.newline();

    out.attribute("Label", summary.label.as_deref().unwrap_or("-"));
    out.attribute("Kind", summary.kind);
    out.attribute("Ancestors", &summary.ancestors.join(" > "));
    if let Some(element) = &summary.element {
        out.attribute("Element", element);
    }

    if summary.properties.is_empty() {
        return;
    }
    out.newline();
    out.heading("  Properties");
    out.newline();
    let width = summary
        .properties
        .iter()
        .map(|p| p.name.len())
        .max()
        .unwrap_or(0)
        + 2;
    for property in &summary.properties {
        let value_type = if property.is_list {
            format!("[{}]", property.value_type)
        } else {
            property.value_type.clone()
        };
        let max = property
            .count_max
            .map_or_else(|| "*".to_string(), |max| max.to_string());
        out.property(
            &property.name,
            width,
            &value_type,
            &format!("{}..{}", property.count_min, max),
            &property.label,
        );
    }
}
