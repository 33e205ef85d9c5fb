//! `kiln instances`: List registered instances of a type, best first.

use futures::executor::block_on;

use super::Context;
use crate::output::StyledOutput;

pub fn execute(ctx: &Context, out: &mut StyledOutput, type_ref: &str) -> anyhow::Result<()> {
    let session = ctx.session()?;
    let registrations = if ctx.use_async {
        let ty = block_on(session.resolve_async(type_ref))?;
        block_on(session.registrations_async(&ty))
    } else {
        let ty = session.resolve(type_ref)?;
        session.registrations(&ty)
    };

    if registrations.is_empty() {
        out.warning("No registered instances");
        out.newline();
        return Ok(());
    }

    let width = registrations.iter().map(|r| r.id.len()).max().unwrap_or(0) + 2;
    for registration in &registrations {
        out.registration(&registration.id, width, registration.ranking, &registration.type_id);
    }
    Ok(())
}
