//! Visitor workflows: browsing, contact, donations, volunteering

use newsteps_qa_common::{details, ReferenceKind};
use serde_json::Value;

use super::{act, address, confirm_submission, fill_fields, identity, submit, WorkflowContext};
use crate::browser::{url_path, Locator};
use crate::registry::paths;
use crate::workflow::{StepFuture, StepOutcome, Workflow, DEFAULT_THRESHOLD};

pub fn visitor_browse() -> Workflow<WorkflowContext> {
    Workflow::new("visitor_browse", DEFAULT_THRESHOLD)
        .gate("open_catalog", open_catalog)
        .step("open_first_item", open_first_item)
        .step("confirm_detail", confirm_detail)
}

pub fn contact_form() -> Workflow<WorkflowContext> {
    Workflow::new("contact_form", DEFAULT_THRESHOLD)
        .gate("open_form", open_contact)
        .step("fill_form", fill_contact)
        .step("submit", submit)
        .step("confirm", confirm_contact)
}

pub fn shoe_donation() -> Workflow<WorkflowContext> {
    Workflow::new("shoe_donation", DEFAULT_THRESHOLD)
        .gate("open_form", open_shoe_donation)
        .step("fill_donor", fill_donor)
        .step("fill_address", fill_address)
        .step("fill_donation", fill_shoe_details)
        .step("select_pickup", select_pickup)
        .step("submit", submit)
        .step("confirm", confirm_shoe_donation)
}

pub fn money_donation() -> Workflow<WorkflowContext> {
    Workflow::new("money_donation", DEFAULT_THRESHOLD)
        .gate("open_form", open_money_donation)
        .step("fill_donor", fill_donor)
        .step("fill_amount", fill_amount)
        .step("submit", submit)
        .step("confirm", confirm_money_donation)
}

pub fn volunteer_application() -> Workflow<WorkflowContext> {
    Workflow::new("volunteer_application", DEFAULT_THRESHOLD)
        .gate("open_form", open_volunteer)
        .step("fill_identity", fill_donor)
        .step("fill_location", fill_location)
        .step("select_availability", select_availability)
        .step("select_interests", select_interests)
        .step("fill_experience", fill_experience)
        .step("submit", submit)
        .step("confirm", confirm_volunteer)
}

fn open_catalog(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(async move {
        let mut details = ctx.visit(paths::SHOES).await?;
        let items = Locator::parse(ctx.registry.catalog_items)?;
        let found = ctx.page()?.count(&items).await?;
        details.insert("shoes_found".into(), Value::from(found));
        ctx.shared.insert("shoes_found".into(), Value::from(found));
        Ok(StepOutcome::verdict(found > 0, "no items", details))
    })
}

fn open_first_item(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(async move {
        let page = ctx.page()?;
        let selector = ctx.resolver().resolve(page, "first-item", "").await?.require()?;
        ctx.waiter().settle(page).await;
        let url = page.url().await?;
        Ok(StepOutcome::pass(details! { "selector" => selector, "url" => url }))
    })
}

fn confirm_detail(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(async move {
        let url = ctx.page()?.url().await?;
        let on_detail = is_detail_path(url_path(&url));
        ctx.shared
            .insert("shoe_detail_accessible".into(), Value::Bool(on_detail));
        Ok(StepOutcome::verdict(
            on_detail,
            "navigation did not reach an item page",
            details! { "url" => url, "shoe_detail_accessible" => on_detail },
        ))
    })
}

/// `/shoes/<id>` with a non-empty id segment
pub(crate) fn is_detail_path(path: &str) -> bool {
    path.strip_prefix(paths::SHOE_DETAIL_PREFIX)
        .map(|id| !id.is_empty() && !id.contains('/'))
        .unwrap_or(false)
}

pub(crate) fn open_contact(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(async move { Ok(StepOutcome::pass(ctx.visit(paths::CONTACT).await?)) })
}

pub(crate) fn fill_contact(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(async move {
        let mut fields = identity(ctx);
        fields.retain(|(name, _)| *name != "phone");
        fields.push(("subject", "QA Acceptance Test".to_string()));
        fields.push((
            "message",
            "Automated acceptance test message, please ignore.".to_string(),
        ));
        fill_fields(ctx, &fields).await
    })
}

pub(crate) fn confirm_contact(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    // Contact submissions carry no dedicated reference family
    Box::pin(confirm_submission(ctx, ReferenceKind::Generic, "contact_reference"))
}

fn open_shoe_donation(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(async move { Ok(StepOutcome::pass(ctx.visit(paths::DONATE_SHOES).await?)) })
}

fn open_money_donation(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(async move { Ok(StepOutcome::pass(ctx.visit(paths::DONATE).await?)) })
}

fn open_volunteer(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(async move { Ok(StepOutcome::pass(ctx.visit(paths::VOLUNTEER).await?)) })
}

fn fill_donor(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(async move {
        let fields = identity(ctx);
        fill_fields(ctx, &fields).await
    })
}

fn fill_address(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(async move { fill_fields(ctx, &address()).await })
}

fn fill_shoe_details(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(async move {
        let fields = [
            ("numberOfShoes", "2".to_string()),
            (
                "donationDescription",
                "Two pairs of gently used running shoes from the QA run.".to_string(),
            ),
        ];
        fill_fields(ctx, &fields).await
    })
}

pub(crate) fn select_pickup(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(async move { act(ctx, "pickup-option", "pickup").await })
}

fn confirm_shoe_donation(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(confirm_submission(ctx, ReferenceKind::ShoeDonation, "shoe_donation_id"))
}

fn fill_amount(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(async move {
        let fields = [
            ("amount", "25".to_string()),
            ("message", "Keep kids running.".to_string()),
        ];
        fill_fields(ctx, &fields).await
    })
}

fn confirm_money_donation(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(confirm_submission(ctx, ReferenceKind::MoneyDonation, "money_donation_id"))
}

fn fill_location(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(async move { fill_fields(ctx, &[("location", "San Francisco, CA".to_string())]).await })
}

fn select_availability(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(async move { act(ctx, "availability", "Weekends").await })
}

fn select_interests(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(async move { act(ctx, "interests", "events").await })
}

fn fill_experience(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(async move {
        let fields = [
            ("experience", "Coached a youth track team for two seasons.".to_string()),
            ("message", "Happy to help at weekend events.".to_string()),
        ];
        fill_fields(ctx, &fields).await
    })
}

fn confirm_volunteer(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(confirm_submission(ctx, ReferenceKind::Volunteer, "volunteer_id"))
}
