//! Status and tag enums for orders, payments and users.

use serde::{Deserialize, Serialize};

/// Payment status of an order.
///
/// ```text
/// Pending ──► AwaitingPayment ──► Paid
///    │              │
///    └──────────────┴──────────► Failed
/// ```
///
/// `Paid` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "bookstore.payment_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Order created, stock reserved, no payment started.
    #[default]
    Pending,
    /// A provider intent exists and has not been verified yet.
    AwaitingPayment,
    /// Provider confirmed the payment.
    Paid,
    /// Payment failed or was declined; reserved stock is returned.
    Failed,
}

impl PaymentStatus {
    /// Whether no further transition is allowed.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Paid | Self::Failed)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending | Self::AwaitingPayment, Self::AwaitingPayment | Self::Paid | Self::Failed)
        )
    }

    /// Snake-case name as stored and serialized.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::AwaitingPayment => "awaiting_payment",
            Self::Paid => "paid",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment provider selected for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "bookstore.payment_method", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Stripe,
    Paystack,
    Flutterwave,
}

impl PaymentMethod {
    /// All supported providers.
    pub const ALL: [Self; 3] = [Self::Stripe, Self::Paystack, Self::Flutterwave];

    /// Lower-case provider name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stripe => "stripe",
            Self::Paystack => "paystack",
            Self::Flutterwave => "flutterwave",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stripe" => Ok(Self::Stripe),
            "paystack" => Ok(Self::Paystack),
            "flutterwave" => Ok(Self::Flutterwave),
            _ => Err(format!("invalid payment method: {s}")),
        }
    }
}

/// User role with different permission levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "bookstore.user_role", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Regular customer.
    #[default]
    User,
    /// Catalog management.
    Admin,
    /// Catalog management plus user administration.
    RootAdmin,
}

impl UserRole {
    /// Whether this role may modify the catalog.
    #[must_use]
    pub const fn can_manage_catalog(self) -> bool {
        matches!(self, Self::Admin | Self::RootAdmin)
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Admin => write!(f, "admin"),
            Self::RootAdmin => write!(f, "root_admin"),
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            "root_admin" | "root-admin" => Ok(Self::RootAdmin),
            _ => Err(format!("invalid user role: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states_accept_no_transition() {
        for terminal in [PaymentStatus::Paid, PaymentStatus::Failed] {
            assert!(terminal.is_terminal());
            for next in [
                PaymentStatus::Pending,
                PaymentStatus::AwaitingPayment,
                PaymentStatus::Paid,
                PaymentStatus::Failed,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_open_states_reach_terminal() {
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::AwaitingPayment));
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Failed));
        assert!(PaymentStatus::AwaitingPayment.can_transition_to(PaymentStatus::AwaitingPayment));
        assert!(PaymentStatus::AwaitingPayment.can_transition_to(PaymentStatus::Paid));
        assert!(!PaymentStatus::AwaitingPayment.can_transition_to(PaymentStatus::Pending));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&PaymentStatus::AwaitingPayment).unwrap_or_default();
        assert_eq!(json, "\"awaiting_payment\"");
    }

    #[test]
    fn test_payment_method_round_trips_through_str() {
        for method in PaymentMethod::ALL {
            assert_eq!(method.as_str().parse::<PaymentMethod>(), Ok(method));
        }
        assert!("paypal".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn test_role_accepts_legacy_spelling() {
        assert_eq!("root-admin".parse::<UserRole>(), Ok(UserRole::RootAdmin));
        assert_eq!(UserRole::RootAdmin.to_string(), "root_admin");
        assert!(!UserRole::User.can_manage_catalog());
    }
}
