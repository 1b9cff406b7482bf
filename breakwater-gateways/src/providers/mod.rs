//! Provider adapters
//!
//! One module per payment provider. All three are always compiled; the
//! factory decides at runtime which one serves a given vendor.

pub mod asaas;
pub mod mercadopago;
pub mod pushinpay;

pub use asaas::AsaasGateway;
pub use mercadopago::MercadoPagoGateway;
pub use pushinpay::PushinPayGateway;
