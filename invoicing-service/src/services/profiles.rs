//! Business profile: registration and profile updates.

use std::sync::Arc;

use service_core::error::AppError;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::models::{
    CreateUser, PlanTier, Subscription, UpdateUser, User, DEFAULT_INVOICE_TEMPLATE, INVOICE_TEMPLATES,
};
use crate::services::clients::{normalize_gstin, normalize_gstin_update};
use crate::services::metrics::SUBSCRIPTION_CHANGES_TOTAL;
use crate::services::quota;
use crate::services::store::Store;

#[derive(Clone)]
pub struct ProfileService {
    store: Arc<dyn Store>,
}

impl ProfileService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Register a user and open their free subscription.
    #[instrument(skip(self, input), fields(user_id = %input.user_id))]
    pub async fn register(&self, mut input: CreateUser) -> Result<(User, Subscription), AppError> {
        input.email = input.email.trim().to_lowercase();
        input.gstin = normalize_gstin(input.gstin)?;

        let (user, subscription) = self.store.create_user(&input).await?;
        SUBSCRIPTION_CHANGES_TOTAL
            .with_label_values(&[PlanTier::Free.as_str(), "signup"])
            .inc();
        info!(user_id = %user.user_id, "User registered");
        Ok((user, subscription))
    }

    pub async fn get(&self, user_id: Uuid) -> Result<User, AppError> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))
    }

    #[instrument(skip(self, input), fields(user_id = %user_id))]
    pub async fn update(&self, user_id: Uuid, mut input: UpdateUser) -> Result<User, AppError> {
        input.gstin = normalize_gstin_update(input.gstin)?;

        if let Some(template) = input.invoice_template.as_deref() {
            if !INVOICE_TEMPLATES.contains(&template) {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Unknown invoice template '{}'",
                    template
                )));
            }
            if template != DEFAULT_INVOICE_TEMPLATE {
                let active = self.store.active_subscription(user_id).await?;
                let (plan, _) = quota::effective_plan(active.as_ref());
                if !plan.limits().template_choice {
                    return Err(AppError::Forbidden(anyhow::anyhow!(
                        "Template choice requires the Pro or Enterprise plan"
                    )));
                }
            }
        }

        let user = self
            .store
            .update_user(user_id, &input)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))?;
        info!("Profile updated");
        Ok(user)
    }
}
