//! Administrator workflows: dashboard reachability and inventory entry

use newsteps_qa_common::details;
use serde_json::Value;

use super::{fill_fields, submit, WorkflowContext};
use crate::browser::{url_path, Locator, Page};
use crate::error::HarnessResult;
use crate::registry::{find_token, paths, registry, Registry};
use crate::session::Role;
use crate::workflow::{StepFuture, StepOutcome, Workflow, DEFAULT_THRESHOLD};

pub fn admin_dashboard() -> Workflow<WorkflowContext> {
    let mut workflow = Workflow::new("admin_dashboard", DEFAULT_THRESHOLD)
        .gate("admin_login", admin_login)
        .step("dashboard", dashboard);
    for surface in &registry().admin_surfaces {
        workflow = workflow.step_with(format!("surface:{}", surface), surface_accessible, *surface);
    }
    workflow
}

pub fn admin_inventory_add() -> Workflow<WorkflowContext> {
    Workflow::new("admin_inventory_add", DEFAULT_THRESHOLD)
        .requires("admin_dashboard")
        .gate("admin_login", admin_login)
        .gate("open_add_form", open_add_form)
        .step("fill_text_fields", fill_text_fields)
        .step("select_dropdowns", select_dropdowns)
        .step("submit", submit)
        .step("confirm_created", confirm_created)
}

/// Administrator protocol on the primary context
pub(crate) fn admin_login(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(async move {
        let outcome = ctx.sessions().establish(ctx.page()?, Role::Admin).await?;
        Ok(outcome
            .checks
            .into_iter()
            .last()
            .map(StepOutcome::from)
            .unwrap_or_else(|| StepOutcome::fail("no login attempted", details! {})))
    })
}

/// First dashboard marker present on the page
async fn dashboard_marker(page: &dyn Page, registry: &Registry) -> HarnessResult<Option<&'static str>> {
    for candidate in &registry.dashboard_markers {
        if page.count(&Locator::parse(candidate)?).await? > 0 {
            return Ok(Some(*candidate));
        }
    }
    Ok(None)
}

fn dashboard(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(async move {
        let mut details = ctx.visit(paths::ADMIN).await?;
        let page = ctx.page()?;
        let url = page.url().await?;
        if url_path(&url).starts_with(paths::LOGIN) {
            return Ok(StepOutcome::fail("admin root redirected to login", details));
        }
        let marker = dashboard_marker(page, ctx.registry).await?;
        details.insert("marker".into(), serde_json::json!(marker));
        Ok(StepOutcome::verdict(marker.is_some(), "no dashboard marker", details))
    })
}

/// Loaded, non-empty, and not bounced to login
pub(crate) fn surface_check(path: &str, body: &str) -> Result<(), &'static str> {
    if path.starts_with(paths::LOGIN) {
        return Err("redirected to login");
    }
    let text = body.trim();
    if text.is_empty() {
        return Err("empty content");
    }
    if text.starts_with("404") || text.to_lowercase().contains("could not be found") {
        return Err("not found");
    }
    Ok(())
}

fn surface_accessible<'a>(ctx: &'a mut WorkflowContext, surface: &'static str) -> StepFuture<'a> {
    Box::pin(async move {
        let mut details = ctx.visit(&Registry::admin_surface_path(surface)).await?;
        let page = ctx.page()?;
        let url = page.url().await?;
        let body = page.body_text().await?;
        details.insert("surface".into(), Value::String(surface.to_string()));
        details.insert("content_length".into(), Value::from(body.trim().len()));
        Ok(match surface_check(url_path(&url), &body) {
            Ok(()) => StepOutcome::pass(details),
            Err(reason) => StepOutcome::fail(reason, details),
        })
    })
}

fn open_add_form(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(async move {
        let details = ctx.visit(paths::ADMIN_ADD_SHOE).await?;
        let url = ctx.page()?.url().await?;
        Ok(StepOutcome::verdict(
            url_path(&url).starts_with(paths::ADMIN_ADD_SHOE),
            "add form not reachable",
            details,
        ))
    })
}

fn fill_text_fields(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(async move {
        let model = format!("QA Runner {}", WorkflowContext::epoch());
        let fields = [
            ("modelName", model.clone()),
            ("size", "10".to_string()),
            ("color", "Blue".to_string()),
        ];
        let mut outcome = fill_fields(ctx, &fields).await?;
        outcome.details.insert("model".into(), Value::String(model));
        Ok(outcome)
    })
}

fn select_dropdowns(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(async move {
        let fields = [
            ("brand", "Nike".to_string()),
            ("gender", "Unisex".to_string()),
            ("sport", "Running".to_string()),
            ("condition", "Like New".to_string()),
        ];
        fill_fields(ctx, &fields).await
    })
}

fn confirm_created(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(async move {
        let page = ctx.page()?;
        let url = page.url().await?;
        let body = page.body_text().await?;
        let left_form = !url_path(&url).starts_with(paths::ADMIN_ADD_SHOE);
        let token = find_token(&body, &ctx.registry.inventory_tokens);
        Ok(StepOutcome::verdict(
            left_form || token.is_some(),
            "still on the add form with no confirmation",
            details! { "url" => url, "left_form" => left_form, "token" => token },
        ))
    })
}
