//! Row types and enumerated status fields.
//!
//! Every enumeration is stored as lower-case text (the same spelling the
//! JSON API uses) and guarded by a CHECK constraint in the schema.

use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = AppError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim() {
                    $($text => Ok($name::$variant),)+
                    other => Err(AppError::validation(format!(
                        "invalid {}: {other:?}",
                        stringify!($name)
                    ))),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let text = value.as_str()?;
                text.parse()
                    .map_err(|e: AppError| FromSqlError::Other(e.to_string().into()))
            }
        }
    };
}

text_enum!(UserRole {
    Admin => "admin",
    Clerk => "clerk",
});

text_enum!(TruckStatus {
    Active => "active",
    Maintenance => "maintenance",
    Inactive => "inactive",
});

text_enum!(DriverStatus {
    Active => "active",
    Inactive => "inactive",
});

text_enum!(TripStatus {
    Running => "running",
    Completed => "completed",
});

text_enum!(
    /// How the consignor settles freight. `Topay` means the receiver pays on delivery.
    PaymentMode {
        Cash => "cash",
        Upi => "upi",
        Account => "account",
        Topay => "topay",
    }
);

text_enum!(PaymentStatus {
    Paid => "paid",
    Pending => "pending",
    Topay => "topay",
});

text_enum!(DeliveryOption {
    Office => "office",
    DoorDelivery => "door_delivery",
});

text_enum!(DeliveryStatus {
    Pending => "pending",
    InTransit => "in_transit",
    Delivered => "delivered",
});

text_enum!(PaymentMethod {
    Cash => "cash",
    Upi => "upi",
    BankTransfer => "bank_transfer",
    Cheque => "cheque",
});

text_enum!(ExpenseType {
    Diesel => "diesel",
    Toll => "toll",
    Maintenance => "maintenance",
    DriverAllowance => "driver_allowance",
    Other => "other",
});

impl PaymentMode {
    /// Payment status a new GC note starts with.
    pub fn initial_payment_status(self) -> PaymentStatus {
        match self {
            PaymentMode::Topay => PaymentStatus::Topay,
            PaymentMode::Cash | PaymentMode::Upi | PaymentMode::Account => PaymentStatus::Pending,
        }
    }
}

impl DeliveryStatus {
    fn rank(self) -> u8 {
        match self {
            DeliveryStatus::Pending => 0,
            DeliveryStatus::InTransit => 1,
            DeliveryStatus::Delivered => 2,
        }
    }

    /// Delivery only moves forward; `pending` may skip straight to `delivered`.
    pub fn can_advance_to(self, next: DeliveryStatus) -> bool {
        next.rank() > self.rank()
    }
}

impl PaymentStatus {
    pub fn can_change_to(self, next: PaymentStatus) -> bool {
        self != PaymentStatus::Paid && self != next
    }
}

impl DeliveryStatus {
    pub fn label(self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "Pending",
            DeliveryStatus::InTransit => "In Transit",
            DeliveryStatus::Delivered => "Delivered",
        }
    }
}

impl DeliveryOption {
    pub fn label(self) -> &'static str {
        match self {
            DeliveryOption::Office => "Office Pickup",
            DeliveryOption::DoorDelivery => "Door Delivery",
        }
    }
}

impl ExpenseType {
    pub fn label(self) -> &'static str {
        match self {
            ExpenseType::Diesel => "Diesel",
            ExpenseType::Toll => "Toll",
            ExpenseType::Maintenance => "Maintenance",
            ExpenseType::DriverAllowance => "Driver Allowance",
            ExpenseType::Other => "Other",
        }
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub role: UserRole,
    pub phone_number: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            email: row.get("email")?,
            full_name: row.get("full_name")?,
            role: row.get("role")?,
            phone_number: row.get("phone_number")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Truck {
    pub id: String,
    pub lorry_number: String,
    pub model: Option<String>,
    pub capacity_kg: Option<f64>,
    pub registration_date: Option<String>,
    pub insurance_expiry: Option<String>,
    pub fitness_expiry: Option<String>,
    pub status: TruckStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl Truck {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            lorry_number: row.get("lorry_number")?,
            model: row.get("model")?,
            capacity_kg: row.get("capacity_kg")?,
            registration_date: row.get("registration_date")?,
            insurance_expiry: row.get("insurance_expiry")?,
            fitness_expiry: row.get("fitness_expiry")?,
            status: row.get("status")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Driver {
    pub id: String,
    pub driver_name: String,
    pub license_number: String,
    pub phone_number: String,
    pub address: Option<String>,
    pub license_expiry: Option<String>,
    pub date_of_birth: Option<String>,
    pub status: DriverStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl Driver {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            driver_name: row.get("driver_name")?,
            license_number: row.get("license_number")?,
            phone_number: row.get("phone_number")?,
            address: row.get("address")?,
            license_expiry: row.get("license_expiry")?,
            date_of_birth: row.get("date_of_birth")?,
            status: row.get("status")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Route {
    pub id: String,
    pub from_location: String,
    pub to_location: String,
    pub distance_km: f64,
    pub estimated_hours: Option<f64>,
    pub created_at: String,
    pub updated_at: String,
}

impl Route {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            from_location: row.get("from_location")?,
            to_location: row.get("to_location")?,
            distance_km: row.get("distance_km")?,
            estimated_hours: row.get("estimated_hours")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// A trip. `total_trip_expense`, `total_revenue` and `trip_profit_loss`
/// are maintained by the store and never written directly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trip {
    pub id: String,
    pub trip_id: String,
    pub truck_id: String,
    pub driver_id: String,
    pub route_id: String,
    pub from_location: String,
    pub to_location: String,
    pub starting_time: String,
    pub ending_time: Option<String>,
    pub total_distance_km: f64,
    pub diesel_liters: f64,
    pub diesel_cost: f64,
    pub toll_charges: f64,
    pub other_expenses: f64,
    pub driver_allowance: f64,
    pub total_trip_expense: f64,
    pub total_revenue: f64,
    pub trip_profit_loss: f64,
    pub trip_status: TripStatus,
    pub notes: Option<String>,
    pub created_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Trip {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            trip_id: row.get("trip_id")?,
            truck_id: row.get("truck_id")?,
            driver_id: row.get("driver_id")?,
            route_id: row.get("route_id")?,
            from_location: row.get("from_location")?,
            to_location: row.get("to_location")?,
            starting_time: row.get("starting_time")?,
            ending_time: row.get("ending_time")?,
            total_distance_km: row.get("total_distance_km")?,
            diesel_liters: row.get("diesel_liters")?,
            diesel_cost: row.get("diesel_cost")?,
            toll_charges: row.get("toll_charges")?,
            other_expenses: row.get("other_expenses")?,
            driver_allowance: row.get("driver_allowance")?,
            total_trip_expense: row.get("total_trip_expense")?,
            total_revenue: row.get("total_revenue")?,
            trip_profit_loss: row.get("trip_profit_loss")?,
            trip_status: row.get("trip_status")?,
            notes: row.get("notes")?,
            created_by: row.get("created_by")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Trip joined with the truck and driver it runs with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TripView {
    #[serde(flatten)]
    pub trip: Trip,
    pub lorry_number: String,
    pub driver_name: String,
}

impl TripView {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            trip: Trip::from_row(row)?,
            lorry_number: row.get("lorry_number")?,
            driver_name: row.get("driver_name")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GcNote {
    pub id: String,
    pub gc_number: String,
    /// Row id of the owning trip (not the `TRIP-…` code).
    pub trip_id: String,
    pub date_time: String,
    pub consignor_name: String,
    pub consignor_address: String,
    pub consignor_phone: String,
    pub consignor_gstin: Option<String>,
    pub consignee_name: String,
    pub consignee_address: String,
    pub consignee_phone: String,
    pub consignee_gstin: Option<String>,
    pub number_of_articles: i64,
    pub description_of_goods: String,
    pub weight_kg: f64,
    pub freight_rate: f64,
    pub freight_amount: f64,
    pub hc_charge: f64,
    pub sc_charge: f64,
    pub total_amount: f64,
    pub payment_mode: PaymentMode,
    pub payment_status: PaymentStatus,
    pub delivery_option: DeliveryOption,
    pub delivery_status: DeliveryStatus,
    pub delivered_at: Option<String>,
    pub delivered_by: Option<String>,
    pub delivery_proof_image: Option<String>,
    pub qr_code_data: Option<String>,
    pub remarks: Option<String>,
    pub created_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl GcNote {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            gc_number: row.get("gc_number")?,
            trip_id: row.get("trip_id")?,
            date_time: row.get("date_time")?,
            consignor_name: row.get("consignor_name")?,
            consignor_address: row.get("consignor_address")?,
            consignor_phone: row.get("consignor_phone")?,
            consignor_gstin: row.get("consignor_gstin")?,
            consignee_name: row.get("consignee_name")?,
            consignee_address: row.get("consignee_address")?,
            consignee_phone: row.get("consignee_phone")?,
            consignee_gstin: row.get("consignee_gstin")?,
            number_of_articles: row.get("number_of_articles")?,
            description_of_goods: row.get("description_of_goods")?,
            weight_kg: row.get("weight_kg")?,
            freight_rate: row.get("freight_rate")?,
            freight_amount: row.get("freight_amount")?,
            hc_charge: row.get("hc_charge")?,
            sc_charge: row.get("sc_charge")?,
            total_amount: row.get("total_amount")?,
            payment_mode: row.get("payment_mode")?,
            payment_status: row.get("payment_status")?,
            delivery_option: row.get("delivery_option")?,
            delivery_status: row.get("delivery_status")?,
            delivered_at: row.get("delivered_at")?,
            delivered_by: row.get("delivered_by")?,
            delivery_proof_image: row.get("delivery_proof_image")?,
            qr_code_data: row.get("qr_code_data")?,
            remarks: row.get("remarks")?,
            created_by: row.get("created_by")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// GC note joined with the trip code, route endpoints and truck.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GcNoteView {
    #[serde(flatten)]
    pub note: GcNote,
    pub trip_code: String,
    pub from_location: String,
    pub to_location: String,
    pub lorry_number: String,
}

impl GcNoteView {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            note: GcNote::from_row(row)?,
            trip_code: row.get("trip_code")?,
            from_location: row.get("from_location")?,
            to_location: row.get("to_location")?,
            lorry_number: row.get("lorry_number")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: String,
    pub gc_note_id: String,
    pub payment_date: String,
    pub amount: f64,
    pub payment_method: PaymentMethod,
    pub reference_number: Option<String>,
    pub remarks: Option<String>,
    pub received_by: Option<String>,
    pub created_at: String,
}

impl Payment {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            gc_note_id: row.get("gc_note_id")?,
            payment_date: row.get("payment_date")?,
            amount: row.get("amount")?,
            payment_method: row.get("payment_method")?,
            reference_number: row.get("reference_number")?,
            remarks: row.get("remarks")?,
            received_by: row.get("received_by")?,
            created_at: row.get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Expense {
    pub id: String,
    pub trip_id: Option<String>,
    pub expense_type: ExpenseType,
    pub amount: f64,
    pub expense_date: String,
    pub description: Option<String>,
    pub receipt_image: Option<String>,
    pub created_by: Option<String>,
    pub created_at: String,
}

impl Expense {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            trip_id: row.get("trip_id")?,
            expense_type: row.get("expense_type")?,
            amount: row.get("amount")?,
            expense_date: row.get("expense_date")?,
            description: row.get("description")?,
            receipt_image: row.get("receipt_image")?,
            created_by: row.get("created_by")?,
            created_at: row.get("created_at")?,
        })
    }
}
