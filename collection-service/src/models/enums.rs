//! Shared enumerations for the collection domain.

use serde::{Deserialize, Serialize};

/// Category of revenue a tenant collects. Each has its own account with its
/// own bank details and gateway sub-account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeType {
    ApartmentCost,
    Maintenance,
    OtherCharges,
    PropertyTax,
    WaterCharges,
    ElectricityTax,
}

impl ChargeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeType::ApartmentCost => "apartment_cost",
            ChargeType::Maintenance => "maintenance",
            ChargeType::OtherCharges => "other_charges",
            ChargeType::PropertyTax => "property_tax",
            ChargeType::WaterCharges => "water_charges",
            ChargeType::ElectricityTax => "electricity_tax",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "apartment_cost" => Some(ChargeType::ApartmentCost),
            "maintenance" => Some(ChargeType::Maintenance),
            "other_charges" => Some(ChargeType::OtherCharges),
            "property_tax" => Some(ChargeType::PropertyTax),
            "water_charges" => Some(ChargeType::WaterCharges),
            "electricity_tax" => Some(ChargeType::ElectricityTax),
            _ => None,
        }
    }
}

/// External payment processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Razorpay,
    Billdesk,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Razorpay => "razorpay",
            Provider::Billdesk => "billdesk",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "razorpay" => Some(Provider::Razorpay),
            "billdesk" => Some(Provider::Billdesk),
            _ => None,
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the client pays at the gateway's hosted page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Netbanking,
    CreditCard,
    DebitCard,
    Upi,
    Wallet,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Netbanking => "netbanking",
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::DebitCard => "debit_card",
            PaymentMethod::Upi => "upi",
            PaymentMethod::Wallet => "wallet",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "netbanking" => Some(PaymentMethod::Netbanking),
            "credit_card" => Some(PaymentMethod::CreditCard),
            "debit_card" => Some(PaymentMethod::DebitCard),
            "upi" => Some(PaymentMethod::Upi),
            "wallet" => Some(PaymentMethod::Wallet),
            _ => None,
        }
    }
}
