//! `kiln instance`: Print the best-ranked instance of a type.

use futures::executor::block_on;

use super::Context;
use crate::output::StyledOutput;

pub fn execute(ctx: &Context, out: &mut StyledOutput, type_ref: &str, required: bool) -> anyhow::Result<()> {
    let session = ctx.session()?;
    let found = if ctx.use_async {
        block_on(session.best_instance_async(type_ref, required))?
    } else {
        session.best_instance(type_ref, required)?
    };

    match found {
        Some(value) => {
            out.plain(&serde_json::to_string_pretty(&value.to_spec())?);
            out.newline();
        }
        None => {
            out.warning("No instance available");
            out.newline();
        }
    }
    Ok(())
}
