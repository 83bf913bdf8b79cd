//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `orders` - Checkout, order listing, status transitions
//! - `downloads` - Free and purchased file delivery
//! - `payment` - Payment provider registry
//! - `email` - Notification dispatcher (confirmation, reset, contact)
//! - `password_reset` - Reset token issuance and redemption
//! - `contact` - Contact form forwarding
//!
//! Services hold their collaborators as trait objects (`Arc<dyn ...>`), so the
//! same code runs against `PostgreSQL` and object storage in production and
//! against in-memory fakes in tests.

pub mod contact;
pub mod downloads;
pub mod email;
pub mod orders;
pub mod password_reset;
pub mod payment;

pub use contact::{ContactError, ContactForm, ContactService};
pub use downloads::{DownloadError, DownloadGate, DownloadService, DownloadTicket};
pub use email::{ContactMessage, DisabledNotifier, EmailError, EmailService, Notifier, SendOutcome};
pub use orders::{CheckoutRequest, CheckoutSettings, OrderError, OrderService, PricePolicy};
pub use password_reset::{PasswordResetService, ResetError};
pub use payment::{PaymentOutcome, PaymentProvider, PaymentProviders};
