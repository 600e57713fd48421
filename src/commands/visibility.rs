//! Admin visibility toggle. Making an experiment public drops its owner
//! reference; the mirror is updated best-effort after the database write.

use anyhow::Result;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::auth::{AccessPolicy, OwnerOrAdminPolicy, Principal, require_admin};
use crate::backup;
use crate::cli::{VisibilityArgs, VisibilityMode};
use crate::error::{PipelineError, PipelineResult};
use crate::files::StorageLayout;
use crate::store::{self, experiments};

pub fn run(args: VisibilityArgs) -> Result<()> {
    let layout = StorageLayout::new(args.storage.data_root());
    layout.ensure()?;

    let db_path = args.storage.resolved_db_path();
    let connection = store::open_store(&db_path)?;

    let principal = Principal::new(
        args.principal.user_id,
        args.principal.username.clone(),
        args.principal.admin,
    );
    let is_public = matches!(args.visibility, VisibilityMode::Public);
    let reassign = args
        .owner_id
        .map(|owner_id| (owner_id, args.owner_username.clone()));

    let warnings = set_visibility(
        &connection,
        &layout,
        &OwnerOrAdminPolicy,
        &principal,
        args.experiment_id,
        is_public,
        reassign,
    )?;

    for warning in &warnings {
        warn!(warning = %warning, "visibility change completed with warning");
    }
    info!(
        experiment_id = args.experiment_id,
        is_public, "visibility updated"
    );
    Ok(())
}

pub fn set_visibility(
    connection: &Connection,
    layout: &StorageLayout,
    policy: &dyn AccessPolicy,
    principal: &Principal,
    experiment_id: i64,
    is_public: bool,
    reassign_owner: Option<(i64, Option<String>)>,
) -> PipelineResult<Vec<String>> {
    require_admin(policy, principal)?;

    let row = experiments::fetch(connection, experiment_id)?.ok_or_else(|| {
        PipelineError::Validation(format!("experiment {experiment_id} not found"))
    })?;

    if is_public && reassign_owner.is_some() {
        return Err(PipelineError::Validation(
            "owner reassignment only applies to private experiments".to_string(),
        ));
    }

    info!(
        experiment_id,
        was_public = row.is_public,
        is_public,
        "updating visibility"
    );

    experiments::update_visibility(connection, experiment_id, is_public)?;
    if let Some((owner_id, owner_username)) = reassign_owner {
        experiments::update_owner(
            connection,
            experiment_id,
            Some(owner_id),
            owner_username.as_deref(),
        )?;
    }

    let mut warnings = Vec::new();
    if let Err(err) = backup::update_visibility(layout, experiment_id, is_public) {
        warn!(error = %err, "mirror visibility update failed");
        warnings.push(format!("csv backup mirror not updated: {err}"));
    }

    Ok(warnings)
}
