//! Admin status transitions over the API, with the inventory invariant:
//! rejecting an approved request restores the available count, shipping it
//! does not.

use newsteps_qa_common::reference::find_reference_of;
use newsteps_qa_common::{details, Details, ReferenceKind};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::{WorkflowContext, ISSUE_KEY};
use crate::error::{HarnessError, HarnessResult};
use crate::payloads;
use crate::probe::{Expect, HttpProbe};
use crate::registry::paths;
use crate::session::{api_login, api_register};
use crate::workflow::{StepFuture, StepOutcome, Workflow, DEFAULT_THRESHOLD, PREREQUISITE_FAILED};

const REQUEST_ID: &str = "status_request_id";
const PRE_APPROVAL: &str = "inventory_pre_approval";
const REJECTION_REASON: &str = "Automated test rejection";

/// Status-bearing entity kinds and where the admin manages them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Request,
    ShoeDonation,
    MoneyDonation,
}

impl Entity {
    fn create_path(&self) -> &'static str {
        match self {
            Entity::Request => paths::API_REQUESTS,
            Entity::ShoeDonation => paths::API_DONATIONS,
            Entity::MoneyDonation => paths::API_MONEY_DONATIONS,
        }
    }

    fn admin_path(&self) -> &'static str {
        match self {
            Entity::Request => paths::API_ADMIN_REQUESTS,
            Entity::ShoeDonation => paths::API_ADMIN_DONATIONS,
            Entity::MoneyDonation => paths::API_ADMIN_MONEY_DONATIONS,
        }
    }

    fn id_key(&self) -> &'static str {
        match self {
            Entity::Request => "requestId",
            _ => "donationId",
        }
    }

    fn reference_kind(&self) -> ReferenceKind {
        match self {
            Entity::Request => ReferenceKind::Request,
            Entity::ShoeDonation => ReferenceKind::ShoeDonation,
            Entity::MoneyDonation => ReferenceKind::MoneyDonation,
        }
    }
}

pub fn status_transitions() -> Workflow<WorkflowContext> {
    Workflow::new("status_transitions", DEFAULT_THRESHOLD)
        .gate("admin_api_login", admin_api_login)
        .gate("user_api_login", user_api_login)
        .step("request_submit", request_submit)
        .step("request_approve", request_approve)
        .step("request_reject", request_reject)
        .step("request_ship", request_ship)
        .step("shoe_donation_process", shoe_donation_process)
        .step("shoe_donation_cancel", shoe_donation_cancel)
        .step("money_donation_process", money_donation_process)
        .step("money_donation_cancel", money_donation_cancel)
        .api_only()
}

fn admin_api_login(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(async move {
        let creds = ctx.sessions().admin_credentials()?;
        let role = api_login(&ctx.admin_api, &creds).await?;
        Ok(StepOutcome::verdict(
            role.eq_ignore_ascii_case("admin"),
            format!("{} has role {}, not admin", creds.email, role),
            details! { "email" => creds.email, "role" => role },
        ))
    })
}

/// Log in the handed-over user, or register a fresh one first
fn user_api_login(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(async move {
        let mut details = Details::new();
        let creds = match ctx.credentials.clone() {
            Some(creds) => creds,
            None => {
                let creds = ctx.sessions().mint();
                let registered = api_register(&ctx.api, &creds).await;
                details.insert("registration_status".into(), Value::from(registered.status));
                if registered.is_server_error() || registered.status == 0 {
                    return Ok(StepOutcome::fail(
                        format!("registration failed with status {}", registered.status),
                        details,
                    ));
                }
                creds
            }
        };
        let role = api_login(&ctx.api, &creds).await?;
        details.insert("email".into(), Value::String(creds.email.clone()));
        details.insert("role".into(), Value::String(role));
        ctx.credentials = Some(creds);
        Ok(StepOutcome::pass(details))
    })
}

fn request_submit(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(async move {
        let before = inventory_total(&ctx.api).await?;
        let (id, mut details) = create(ctx, Entity::Request).await?;
        let after = inventory_total(&ctx.api).await?;
        details.insert("inventory_before".into(), Value::from(before));
        details.insert("inventory_after".into(), Value::from(after));
        if let Some(id) = &id {
            ctx.shared.insert(REQUEST_ID.into(), Value::String(id.clone()));
        }
        Ok(judge(
            &[
                (id.is_some(), "no request reference in response".to_string()),
                (before == after, format!("inventory changed at submission: {} -> {}", before, after)),
            ],
            details,
        ))
    })
}

fn request_approve(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(async move {
        let Some(id) = shared_str(ctx, REQUEST_ID) else {
            return Ok(StepOutcome::fail("no submitted request", Details::new()));
        };
        let before = inventory_total(&ctx.api).await?;
        let mut transitions = Vec::new();
        let ok = transition(ctx, Entity::Request, &id, "submitted", "approved", None, &mut transitions).await;
        let after = inventory_total(&ctx.api).await?;
        // rejection is only meaningful against an approval that took effect
        if ok && after < before {
            ctx.shared.insert(PRE_APPROVAL.into(), Value::from(before));
        }

        let details = details! {
            "id" => id,
            "transitions" => transitions,
            "inventory_before" => before,
            "inventory_after" => after,
        };
        Ok(judge(
            &[
                (ok, "approval refused by admin API".to_string()),
                (after < before, format!("inventory did not drop on approval: {} -> {}", before, after)),
            ],
            details,
        ))
    })
}

fn request_reject(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(async move {
        let (Some(id), Some(pre)) = (
            shared_str(ctx, REQUEST_ID),
            ctx.shared.get(PRE_APPROVAL).and_then(Value::as_i64),
        ) else {
            return Ok(StepOutcome::fail(PREREQUISITE_FAILED, Details::new()));
        };
        let mut transitions = Vec::new();
        let ok = transition(
            ctx,
            Entity::Request,
            &id,
            "approved",
            "rejected",
            Some(("rejectionReason", REJECTION_REASON)),
            &mut transitions,
        )
        .await;
        let after = inventory_total(&ctx.api).await?;
        let stored = read_back(ctx, Entity::Request, &id).await;
        let restored = after == pre;

        let mut details = details! {
            "id" => id,
            "transitions" => transitions,
            "inventory_pre_approval" => pre,
            "inventory_after" => after,
            "stored_status" => stored,
        };
        if !restored {
            let issue = format!(
                "inventory not restored after rejection of {}: {} before approval, {} after",
                id, pre, after
            );
            warn!("{}", issue);
            details.insert(ISSUE_KEY.into(), Value::String(issue));
        }
        Ok(judge(
            &[
                (ok, "rejection refused by admin API".to_string()),
                (restored, format!("inventory not restored: {} != {}", after, pre)),
                stored_is(&stored, "rejected"),
            ],
            details,
        ))
    })
}

fn request_ship(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(async move {
        let (id, mut details) = create(ctx, Entity::Request).await?;
        let Some(id) = id else {
            return Ok(StepOutcome::fail("no request reference in response", details));
        };
        let before = inventory_total(&ctx.api).await?;
        let mut transitions = Vec::new();
        let approved = transition(ctx, Entity::Request, &id, "submitted", "approved", None, &mut transitions).await;
        let shipped = approved
            && transition(ctx, Entity::Request, &id, "approved", "shipped", None, &mut transitions).await;
        let after = inventory_total(&ctx.api).await?;
        let stored = read_back(ctx, Entity::Request, &id).await;

        details.insert("transitions".into(), json!(transitions));
        details.insert("inventory_before".into(), Value::from(before));
        details.insert("inventory_after".into(), Value::from(after));
        details.insert("stored_status".into(), json!(stored));
        Ok(judge(
            &[
                (shipped, "transition refused by admin API".to_string()),
                (after < before, format!("inventory restored after shipping: {} -> {}", before, after)),
                stored_is(&stored, "shipped"),
            ],
            details,
        ))
    })
}

fn shoe_donation_process(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(donation_cycle(ctx, Entity::ShoeDonation, &["received", "processed"]))
}

fn shoe_donation_cancel(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(donation_cycle(ctx, Entity::ShoeDonation, &["cancelled"]))
}

fn money_donation_process(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(donation_cycle(ctx, Entity::MoneyDonation, &["processed"]))
}

fn money_donation_cancel(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(donation_cycle(ctx, Entity::MoneyDonation, &["cancelled"]))
}

/// Create an entity, walk it along `path` from "submitted", then read back
async fn donation_cycle(
    ctx: &mut WorkflowContext,
    entity: Entity,
    path: &'static [&'static str],
) -> HarnessResult<StepOutcome> {
    let (id, mut details) = create(ctx, entity).await?;
    let Some(id) = id else {
        return Ok(StepOutcome::fail(
            format!("no {} reference in response", entity.reference_kind()),
            details,
        ));
    };

    let mut transitions = Vec::new();
    let mut from = "submitted";
    let mut ok = true;
    for &to in path {
        if !transition(ctx, entity, &id, from, to, None, &mut transitions).await {
            ok = false;
            break;
        }
        from = to;
    }
    let target = path.last().copied().unwrap_or(from);
    let stored = read_back(ctx, entity, &id).await;

    details.insert("transitions".into(), json!(transitions));
    details.insert("stored_status".into(), json!(stored));
    Ok(judge(
        &[
            (ok, "transition refused by admin API".to_string()),
            stored_is(&stored, target),
        ],
        details,
    ))
}

/// Create one entity through the public API; returns its reference when
/// the response carries one of the right shape
async fn create(ctx: &WorkflowContext, entity: Entity) -> HarnessResult<(Option<String>, Details)> {
    let person = ctx.credentials.clone().unwrap_or_else(payloads::default_person);
    let body = match entity {
        Entity::Request => {
            let shoe = first_available_shoe(&ctx.api).await?;
            payloads::request(&person, &shoe)
        }
        Entity::ShoeDonation => payloads::shoe_donation(&person),
        Entity::MoneyDonation => payloads::money_donation(&person),
    };
    let record = ctx.api.post(entity.create_path(), body, Expect::Functional).await;
    let mut details = record.details();
    details.insert("endpoint".into(), Value::String(entity.create_path().to_string()));

    let id = if record.success {
        find_reference_of(entity.reference_kind(), &record.data.to_string())
    } else {
        None
    };
    if let Some(id) = &id {
        debug!("Created {} {}", entity.reference_kind(), id);
        details.insert("id".into(), Value::String(id.clone()));
    }
    Ok((id, details))
}

/// PATCH one status change through the admin API and record it
async fn transition(
    ctx: &WorkflowContext,
    entity: Entity,
    id: &str,
    from: &str,
    to: &str,
    extra: Option<(&str, &str)>,
    log: &mut Vec<Value>,
) -> bool {
    let mut body = Map::new();
    body.insert(entity.id_key().into(), Value::String(id.to_string()));
    body.insert("status".into(), Value::String(to.to_string()));
    if let Some((key, value)) = extra {
        body.insert(key.into(), Value::String(value.to_string()));
    }
    let record = ctx
        .admin_api
        .patch(entity.admin_path(), Value::Object(body), Expect::Functional)
        .await;
    debug!("{} {} -> {}: {}", id, from, to, record.status);
    log.push(json!({
        "from": from,
        "to": to,
        "status": record.status,
        "ok": record.success,
    }));
    record.success
}

/// Stored status from the admin listing; `None` when the entity is not listed
async fn read_back(ctx: &WorkflowContext, entity: Entity, id: &str) -> Option<String> {
    let record = ctx.admin_api.get(entity.admin_path(), Expect::Functional).await;
    if !record.success {
        warn!("Read-back from {} failed with status {}", entity.admin_path(), record.status);
        return None;
    }
    find_entity(&record.data, id)
        .and_then(|e| e.get("status"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// First object anywhere in `value` with a string field equal to `id`
pub(crate) fn find_entity<'v>(value: &'v Value, id: &str) -> Option<&'v Map<String, Value>> {
    match value {
        Value::Object(map) => {
            if map.values().any(|v| v.as_str() == Some(id)) {
                return Some(map);
            }
            map.values().find_map(|v| find_entity(v, id))
        }
        Value::Array(items) => items.iter().find_map(|v| find_entity(v, id)),
        _ => None,
    }
}

fn shoe_list(data: &Value) -> Option<&Vec<Value>> {
    data.get("shoes")
        .and_then(Value::as_array)
        .or_else(|| data.as_array())
}

/// Available units of one listed shoe; a listing without a count is one unit
fn stock_of(shoe: &Value) -> i64 {
    ["inventoryCount", "quantity", "stock"]
        .iter()
        .find_map(|key| shoe.get(key).and_then(Value::as_i64))
        .unwrap_or(1)
}

/// Total available inventory across the public catalog
pub(crate) async fn inventory_total(probe: &HttpProbe) -> HarnessResult<i64> {
    let record = probe.get(paths::API_SHOES, Expect::Functional).await;
    if !record.success {
        return Err(HarnessError::UnexpectedResponse {
            endpoint: paths::API_SHOES.into(),
            reason: record
                .error
                .unwrap_or_else(|| format!("status {}", record.status)),
        });
    }
    let shoes = shoe_list(&record.data).ok_or_else(|| HarnessError::UnexpectedResponse {
        endpoint: paths::API_SHOES.into(),
        reason: "no shoe list in body".into(),
    })?;
    Ok(shoes.iter().map(stock_of).sum())
}

async fn first_available_shoe(probe: &HttpProbe) -> HarnessResult<Value> {
    let record = probe.get(paths::API_SHOES, Expect::Functional).await;
    shoe_list(&record.data)
        .into_iter()
        .flatten()
        .filter(|shoe| stock_of(shoe) > 0)
        .find_map(|shoe| {
            ["_id", "id", "shoeId"]
                .iter()
                .find_map(|key| shoe.get(key).filter(|v| v.is_string() || v.is_number()))
                .cloned()
        })
        .ok_or_else(|| HarnessError::UnexpectedResponse {
            endpoint: paths::API_SHOES.into(),
            reason: "no shoe available to request".into(),
        })
}

fn shared_str(ctx: &WorkflowContext, key: &str) -> Option<String> {
    ctx.shared.get(key).and_then(Value::as_str).map(str::to_string)
}

fn stored_is(stored: &Option<String>, expected: &str) -> (bool, String) {
    match stored {
        Some(status) if status.eq_ignore_ascii_case(expected) => (true, String::new()),
        Some(status) => (false, format!("stored status {}, expected {}", status, expected)),
        None => (false, "status not found in admin listing".to_string()),
    }
}

/// Pass when every check holds; the first failing one names the error
fn judge(checks: &[(bool, String)], details: Details) -> StepOutcome {
    match checks.iter().find(|(ok, _)| !ok) {
        Some((_, reason)) => StepOutcome::fail(reason, details),
        None => StepOutcome::pass(details),
    }
}
