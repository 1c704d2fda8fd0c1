//! Multi-actor handoff: a visitor becomes a user, the user requests shoes,
//! and an administrator in a separate browsing context sees the request.

use newsteps_qa_common::details;
use serde_json::Value;

use super::account::{
    add_to_cart, confirm_request, ensure_login, fill_shipping, open_checkout, register, verify_cart,
};
use super::public::{confirm_contact, fill_contact, open_contact, select_pickup};
use super::{submit, WorkflowContext};
use crate::browser::url_path;
use crate::registry::{paths, Registry};
use crate::session::Role;
use crate::workflow::{StepFuture, StepOutcome, Workflow, DEFAULT_THRESHOLD};

pub fn visitor_to_admin_handoff() -> Workflow<WorkflowContext> {
    Workflow::new("visitor_to_admin_handoff", DEFAULT_THRESHOLD)
        .step("visitor_contact_open", open_contact)
        .step("visitor_contact_fill", fill_contact)
        .step("visitor_contact_submit", submit)
        .step("visitor_contact_confirm", confirm_contact)
        .gate("user_register", register)
        .gate("user_login", ensure_login)
        .gate("user_add_to_cart", add_to_cart)
        .step("user_verify_cart", verify_cart)
        .step("user_open_checkout", open_checkout)
        .step("user_fill_shipping", fill_shipping)
        .step("user_select_pickup", select_pickup)
        .step("user_submit_request", submit)
        .step("user_confirm_request", confirm_request)
        .gate("admin_login", admin_login_secondary)
        .required("admin_observes_request", admin_observes_request)
}

/// The administrator gets their own browsing context
fn admin_login_secondary(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(async move {
        ctx.open_secondary().await?;
        let outcome = ctx
            .sessions()
            .establish(ctx.secondary()?, Role::Admin)
            .await?;
        Ok(outcome
            .checks
            .into_iter()
            .last()
            .map(StepOutcome::from)
            .unwrap_or_else(|| StepOutcome::fail("no login attempted", details! {})))
    })
}

/// The admin request list mentions the request reference or the user's email
fn admin_observes_request(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(async move {
        let page = ctx.secondary()?;
        let mut details = ctx
            .visit_on(page, &Registry::admin_surface_path("requests"))
            .await?;
        let url = page.url().await?;
        if url_path(&url).starts_with(paths::LOGIN) {
            return Ok(StepOutcome::fail("admin request list redirected to login", details));
        }
        let body = page.body_text().await?;

        let request_id = ctx.shared.get("request_id").and_then(Value::as_str);
        let email = ctx.credentials.as_ref().map(|c| c.email.as_str());
        let matched = [("request_id", request_id), ("email", email)]
            .into_iter()
            .find_map(|(key, needle)| needle.filter(|n| body.contains(*n)).map(|_| key));

        details.insert("request_id".into(), serde_json::json!(request_id));
        details.insert("matched".into(), serde_json::json!(matched));
        Ok(StepOutcome::verdict(
            matched.is_some(),
            "request not visible to the administrator",
            details,
        ))
    })
}
