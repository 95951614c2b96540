//! Typed endpoints of the workshop backend.

use chrono::NaiveDate;
use models::{
    dashboard::MechanicDashboard,
    inventory::InventoryItem,
    invoice::Invoice,
    order::Order,
    review::{CreateReview, PendingReview, Review},
    time_slot::TimeSlot,
    user::{LoginRequest, LoginResponse, User},
};
use secrecy::{ExposeSecret, SecretString};
use tracing::info;

use super::api_client::{ApiClient, ApiError, RequestOptions};

mod routes {
    pub const LOGIN: &str = "api/Auth/login";
    pub const CURRENT_USER: &str = "api/Users/me";
    pub const USERS: &str = "api/Users";
    pub const INVENTORY: &str = "api/Inventory";
    pub const ORDERS: &str = "api/Orders";
    pub const INVOICES: &str = "api/Invoices";
    pub const REVIEWS: &str = "api/Reviews";
    pub const PENDING_REVIEWS: &str = "api/Reviews/pending";
    pub const AVAILABLE_SLOTS: &str = "api/TimeSlots/available";
    pub const MECHANIC_DASHBOARD: &str = "api/Mechanic/dashboard";
}

#[derive(Debug, Clone)]
pub struct WorkshopApi {
    client: ApiClient,
}

impl WorkshopApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Authenticate and persist the returned bearer token
    pub async fn login(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<Option<User>, ApiError> {
        let request = LoginRequest {
            email: email.to_string(),
            password: password.expose_secret().to_string(),
        };
        let response: LoginResponse = self
            .client
            .post(routes::LOGIN, &request, RequestOptions::default().anonymous())
            .await?;

        self.client
            .credentials()
            .store(SecretString::from(response.token))?;
        info!(email, "logged in");
        Ok(response.user)
    }

    pub fn logout(&self) -> Result<(), ApiError> {
        self.client.credentials().clear()?;
        info!("logged out");
        Ok(())
    }

    pub fn is_logged_in(&self) -> Result<bool, ApiError> {
        Ok(self.client.credentials().load()?.is_some())
    }

    pub async fn current_user(&self, options: RequestOptions) -> Result<User, ApiError> {
        self.client.get(routes::CURRENT_USER, options).await
    }

    pub async fn list_users(&self, options: RequestOptions) -> Result<Vec<User>, ApiError> {
        self.client.get(routes::USERS, options).await
    }

    pub async fn list_inventory(
        &self,
        search: Option<&str>,
        options: RequestOptions,
    ) -> Result<Vec<InventoryItem>, ApiError> {
        let options = match search.map(str::trim).filter(|s| !s.is_empty()) {
            Some(term) => options.query("search", term),
            None => options,
        };
        self.client.get(routes::INVENTORY, options).await
    }

    pub async fn get_inventory_item(
        &self,
        id: i64,
        options: RequestOptions,
    ) -> Result<InventoryItem, ApiError> {
        self.client
            .get(&format!("{}/{id}", routes::INVENTORY), options)
            .await
    }

    pub async fn list_orders(&self, options: RequestOptions) -> Result<Vec<Order>, ApiError> {
        self.client.get(routes::ORDERS, options).await
    }

    pub async fn get_order(&self, id: i64, options: RequestOptions) -> Result<Order, ApiError> {
        self.client
            .get(&format!("{}/{id}", routes::ORDERS), options)
            .await
    }

    pub async fn list_invoices(&self, options: RequestOptions) -> Result<Vec<Invoice>, ApiError> {
        self.client.get(routes::INVOICES, options).await
    }

    pub async fn list_reviews(&self, options: RequestOptions) -> Result<Vec<Review>, ApiError> {
        self.client.get(routes::REVIEWS, options).await
    }

    /// Completed orders the signed-in user still has to review
    pub async fn pending_reviews(
        &self,
        options: RequestOptions,
    ) -> Result<Vec<PendingReview>, ApiError> {
        self.client.get(routes::PENDING_REVIEWS, options).await
    }

    pub async fn submit_review(
        &self,
        review: &CreateReview,
        options: RequestOptions,
    ) -> Result<Review, ApiError> {
        self.client.post(routes::REVIEWS, review, options).await
    }

    pub async fn available_slots(
        &self,
        date: NaiveDate,
        options: RequestOptions,
    ) -> Result<Vec<TimeSlot>, ApiError> {
        let options = options.query("date", date.format("%Y-%m-%d").to_string());
        self.client.get(routes::AVAILABLE_SLOTS, options).await
    }

    pub async fn mechanic_dashboard(
        &self,
        options: RequestOptions,
    ) -> Result<MechanicDashboard, ApiError> {
        self.client.get(routes::MECHANIC_DASHBOARD, options).await
    }
}
