//! Session-stored state.

/// Session keys for authentication data.
pub mod session_keys {
    /// Key for the signed-in customer record.
    pub const CUSTOMER: &str = "customer";

    /// Key for the customer's ERP bearer token.
    pub const ERP_TOKEN: &str = "erp_token";
}
