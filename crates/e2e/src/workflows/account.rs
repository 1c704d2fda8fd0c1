//! Registered-user workflows: sign-up and the cart to checkout journey

use newsteps_qa_common::{details, ReferenceKind};
use serde_json::Value;

use super::public::select_pickup;
use super::{address, confirm_submission, fill_fields, identity, submit, WorkflowContext};
use crate::browser::{url_path, Locator};
use crate::error::HarnessError;
use crate::registry::paths;
use crate::workflow::{StepFuture, StepOutcome, Workflow, DEFAULT_THRESHOLD, STRICT_THRESHOLD};

const AUTHENTICATED: &str = "authenticated";

pub fn user_registration() -> Workflow<WorkflowContext> {
    Workflow::new("user_registration", DEFAULT_THRESHOLD)
        .gate("register", register)
        .step("login", login)
        .step("revalidate", revalidate)
}

pub fn authenticated_request() -> Workflow<WorkflowContext> {
    Workflow::new("authenticated_request", STRICT_THRESHOLD)
        .requires("visitor_browse")
        .requires("user_registration")
        .gate("login", ensure_login)
        .gate("add_to_cart", add_to_cart)
        .step("verify_cart", verify_cart)
        .step("open_checkout", open_checkout)
        .step("fill_shipping", fill_shipping)
        .step("select_pickup", select_pickup)
        .step("submit_request", submit)
        .step("confirm_request", confirm_request)
}

pub(crate) fn register(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(async move {
        let sessions = ctx.sessions();
        let creds = sessions.mint();
        let check = sessions.register(ctx.page()?, &creds).await?;
        if check.success {
            ctx.credentials = Some(creds);
        }
        Ok(check.into())
    })
}

fn login(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(async move {
        let creds = ctx
            .credentials
            .clone()
            .ok_or_else(|| HarnessError::Authentication("no registered user".into()))?;
        let check = ctx.sessions().login(ctx.page()?, &creds).await?;
        if check.success {
            ctx.shared.insert(AUTHENTICATED.into(), Value::Bool(true));
        }
        Ok(check.into())
    })
}

fn revalidate(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(async move { Ok(ctx.sessions().revalidate(ctx.page()?).await?.into()) })
}

/// Reuse the live session, else log in as the handed-over user, else sign
/// up a fresh one first
pub(crate) fn ensure_login(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(async move {
        if ctx.shared.get(AUTHENTICATED) == Some(&Value::Bool(true)) {
            return Ok(StepOutcome::pass(details! { "reused_session" => true }));
        }
        let creds = match ctx.credentials.clone() {
            Some(creds) => creds,
            None => {
                let sessions = ctx.sessions();
                let creds = sessions.mint();
                let check = sessions.register(ctx.page()?, &creds).await?;
                if !check.success {
                    return Ok(check.into());
                }
                creds
            }
        };
        let check = ctx.sessions().login(ctx.page()?, &creds).await?;
        if check.success {
            ctx.shared.insert(AUTHENTICATED.into(), Value::Bool(true));
            ctx.credentials = Some(creds);
        }
        Ok(check.into())
    })
}

/// Request CTA from the catalog, or from the first item's page
pub(crate) fn add_to_cart(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(async move {
        ctx.visit(paths::SHOES).await?;
        let page = ctx.page()?;
        let mut via = "catalog";
        let mut cta = ctx.quick_resolver().resolve(page, "add-to-cart", "").await?;
        if !cta.resolved() {
            via = "detail";
            ctx.resolver().resolve(page, "first-item", "").await?.require()?;
            ctx.waiter().settle(page).await;
            cta = ctx.resolver().resolve(page, "add-to-cart", "").await?;
        }
        let selector = cta.require()?;
        ctx.waiter().settle(page).await;
        let url = page.url().await?;
        Ok(StepOutcome::pass(details! {
            "selector" => selector,
            "via" => via,
            "url" => url,
        }))
    })
}

/// Non-empty cart: a checkout affordance or at least one item row
pub(crate) fn verify_cart(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(async move {
        let mut details = ctx.visit(paths::CART).await?;
        let page = ctx.page()?;

        let mut checkout_visible = false;
        if let Some(strategy) = ctx.registry.get("checkout") {
            for candidate in &strategy.candidates {
                if page.count(&Locator::parse(candidate)?).await? > 0 {
                    checkout_visible = true;
                    break;
                }
            }
        }
        let mut items = 0;
        for row in &ctx.registry.cart_rows {
            items = items.max(page.count(&Locator::parse(row)?).await?);
        }

        details.insert("checkout_visible".into(), Value::Bool(checkout_visible));
        details.insert("items".into(), Value::from(items));
        Ok(StepOutcome::verdict(
            checkout_visible || items > 0,
            "cart is empty",
            details,
        ))
    })
}

pub(crate) fn open_checkout(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(async move {
        let page = ctx.page()?;
        let clicked = ctx.quick_resolver().resolve(page, "checkout", "").await?;
        let via = if clicked.resolved() {
            ctx.waiter().settle(page).await;
            "affordance"
        } else {
            ctx.visit(paths::CHECKOUT).await?;
            "direct"
        };
        let url = page.url().await?;
        let on_checkout = url_path(&url).starts_with(paths::CHECKOUT);
        Ok(StepOutcome::verdict(
            on_checkout,
            "checkout surface not reached",
            details! { "url" => url, "via" => via },
        ))
    })
}

pub(crate) fn fill_shipping(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(async move {
        let mut fields = identity(ctx);
        fields.extend(address());
        fill_fields(ctx, &fields).await
    })
}

pub(crate) fn confirm_request(ctx: &mut WorkflowContext) -> StepFuture<'_> {
    Box::pin(confirm_submission(ctx, ReferenceKind::Request, "request_id"))
}
