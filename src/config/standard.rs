//! Built-in configuration for the seven standard daily exports

use super::file_types::{
    CardDigitsRule, CategoryRule, FileType, FileTypeConfig, FileTypeRegistry, LengthRule,
    MonetaryRule, RangeRule, ReferentialRule, SpecialRule, ValidationRules,
};
use crate::models::ColumnType as T;

fn monetary(column: &str, soft_ceiling: f64) -> MonetaryRule {
    MonetaryRule {
        column: column.to_string(),
        soft_ceiling,
        allow_negative: false,
    }
}

fn range(column: &str, min: f64, max: f64) -> RangeRule {
    RangeRule {
        column: column.to_string(),
        min,
        max,
    }
}

fn max_len(column: &str, max_len: usize) -> LengthRule {
    LengthRule {
        column: column.to_string(),
        max_len,
    }
}

fn names(columns: &[&str]) -> Vec<String> {
    columns.iter().map(|c| c.to_string()).collect()
}

fn all_items_report() -> FileTypeConfig {
    FileTypeConfig::new(FileType::AllItemsReport)
        .with_column("Master ID", "master_id", T::String)
        .with_column("Item ID", "item_id", T::String)
        .with_column("Parent ID", "parent_id", T::String)
        .with_column("Menu Name", "menu_name", T::String)
        .with_column("Menu Group", "menu_group", T::String)
        .with_column("Subgroup", "subgroup", T::String)
        .with_column("Menu Item", "menu_item", T::String)
        .with_column("Tags", "tags", T::String)
        .with_column("Avg Price", "avg_price", T::Float)
        .with_column("Item Qty (incl voids)", "item_qty_incl_voids", T::Integer)
        .with_column("% of Ttl Qty (incl voids)", "percent_ttl_qty_incl_voids", T::Float)
        .with_column("Gross Amount (incl voids)", "gross_amount_incl_voids", T::Float)
        .with_column("% of Ttl Amt (incl voids)", "percent_ttl_amt_incl_voids", T::Float)
        .with_column("Item Qty", "item_qty", T::Float)
        .with_column("Gross Amount", "gross_amount", T::Float)
        .with_column("Void Qty", "void_qty", T::Float)
        .with_column("Void Amount", "void_amount", T::Float)
        .with_column("Discount Amount", "discount_amount", T::Float)
        .with_column("Net Amount", "net_amount", T::Float)
        .with_column("# Orders", "num_orders", T::Integer)
        .with_column("% of Ttl # Orders", "percent_ttl_num_orders", T::Float)
        .with_column("% Qty (Group)", "percent_qty_group", T::Float)
        .with_column("% Qty (Menu)", "percent_qty_menu", T::Float)
        .with_column("% Qty (All)", "percent_qty_all", T::Float)
        .with_column("% Net Amt (Group)", "percent_net_amt_group", T::Float)
        .with_column("% Net Amt (Menu)", "percent_net_amt_menu", T::Float)
        .with_column("% Net Amt (All)", "percent_net_amt_all", T::Float)
        .with_processing_date()
        .with_rules(ValidationRules {
            monetary: vec![monetary("avg_price", 100.0), monetary("net_amount", 10_000.0)],
            ranges: vec![range("item_qty", 0.0, 10_000.0), range("void_qty", 0.0, 1_000.0)],
            percentage_columns: names(&[
                "percent_ttl_qty_incl_voids",
                "percent_ttl_amt_incl_voids",
                "percent_ttl_num_orders",
                "percent_qty_group",
                "percent_qty_menu",
                "percent_qty_all",
                "percent_net_amt_group",
                "percent_net_amt_menu",
                "percent_net_amt_all",
            ]),
            max_lengths: vec![
                max_len("menu_item", 200),
                max_len("menu_name", 100),
                max_len("tags", 500),
            ],
            ..ValidationRules::default()
        })
        .with_closure_label("menu_item")
}

fn check_details() -> FileTypeConfig {
    FileTypeConfig::new(FileType::CheckDetails)
        .with_column("Customer Id", "customer_id", T::String)
        .with_column("Customer", "customer", T::String)
        .with_column("Customer Phone", "customer_phone", T::String)
        .with_column("Customer Email", "customer_email", T::String)
        .with_column("Location Code", "location_code", T::String)
        .with_column("Opened Date", "opened_date", T::Date)
        .with_column("Opened Time", "opened_time", T::Time)
        .with_column("Item Description", "item_description", T::String)
        .with_column("Server", "server", T::String)
        .with_column("Tax", "tax", T::Float)
        .with_column("Tender", "tender", T::String)
        .with_required_column("Check Id", "check_id", T::String)
        .with_column("Check #", "check_number", T::Integer)
        .with_column("Total", "total", T::Float)
        .with_column("Customer Family", "customer_family", T::String)
        .with_column("Table Size", "table_size", T::Integer)
        .with_column("Discount", "discount", T::Float)
        .with_column("Reason of Discount", "reason_of_discount", T::String)
        .with_column("Link", "link", T::String)
        .with_processing_date()
        .with_rules(ValidationRules {
            monetary: vec![
                monetary("total", 1_000.0),
                monetary("tax", 500.0),
                monetary("discount", 1_000.0),
            ],
            email_columns: names(&["customer_email"]),
            phone_columns: names(&["customer_phone"]),
            max_lengths: vec![
                max_len("customer", 100),
                max_len("server", 50),
                max_len("item_description", 300),
            ],
            key_columns: names(&["check_id"]),
            ..ValidationRules::default()
        })
        .with_closure_label("customer")
}

fn cash_entries() -> FileTypeConfig {
    FileTypeConfig::new(FileType::CashEntries)
        .with_column("Location", "location", T::String)
        .with_required_column("Entry Id", "entry_id", T::String)
        .with_column("Created Date", "created_date", T::DateTime)
        .with_column("Action", "action", T::String)
        .with_column("Amount", "amount", T::Float)
        .with_column("Cash Drawer", "cash_drawer", T::String)
        .with_column("Payout Reason", "payout_reason", T::String)
        .with_column("No Sale Reason", "no_sale_reason", T::String)
        .with_column("Comment", "comment", T::String)
        .with_column("Employee", "employee", T::String)
        .with_column("Employee 2", "employee_2", T::String)
        .with_processing_date()
        .with_rules(ValidationRules {
            monetary: vec![MonetaryRule {
                column: "amount".to_string(),
                soft_ceiling: 5_000.0,
                allow_negative: true,
            }],
            categories: vec![CategoryRule {
                column: "action".to_string(),
                allowed: names(&["Payout", "No Sale", "Cash Drop", "Cash In", "Manager Payout"]),
            }],
            max_lengths: vec![max_len("comment", 500), max_len("payout_reason", 200)],
            key_columns: names(&["entry_id"]),
            ..ValidationRules::default()
        })
        .with_closure_label("action")
}

fn item_selection_details() -> FileTypeConfig {
    FileTypeConfig::new(FileType::ItemSelectionDetails)
        .with_column("Location", "location", T::String)
        .with_column("Order Id", "order_id", T::String)
        .with_column("Order #", "order_number", T::Integer)
        .with_column("Sent Date", "sent_date", T::DateTime)
        .with_column("Order Date", "order_date", T::DateTime)
        .with_column("Check Id", "check_id", T::String)
        .with_column("Server", "server", T::String)
        .with_column("Table", "table", T::String)
        .with_column("Dining Area", "dining_area", T::String)
        .with_column("Service", "service", T::String)
        .with_column("Dining Option", "dining_option", T::String)
        .with_required_column("Item Selection Id", "item_selection_id", T::String)
        .with_column("Item Id", "item_id", T::String)
        .with_column("Master Id", "master_id", T::String)
        .with_column("SKU", "sku", T::String)
        .with_column("PLU", "plu", T::String)
        .with_column("Menu Item", "menu_item", T::String)
        .with_column("Menu Subgroup(s)", "menu_subgroup", T::String)
        .with_column("Menu Group", "menu_group", T::String)
        .with_column("Menu", "menu", T::String)
        .with_column("Sales Category", "sales_category", T::String)
        .with_column("Gross Price", "gross_price", T::Float)
        .with_column("Discount", "discount", T::Float)
        .with_column("Net Price", "net_price", T::Float)
        .with_column("Qty", "quantity", T::Float)
        .with_column("Tax", "tax", T::Float)
        .with_column("Void?", "void", T::Boolean)
        .with_column("Deferred", "deferred", T::Boolean)
        .with_column("Tax Exempt", "tax_exempt", T::Boolean)
        .with_column("Tax Inclusion Option", "tax_inclusion_option", T::String)
        .with_column("Dining Option Tax", "dining_option_tax", T::String)
        .with_column("Tab Name", "tab_name", T::String)
        .with_processing_date()
        .with_rules(ValidationRules {
            monetary: vec![monetary("gross_price", 1_000.0), monetary("net_price", 1_000.0)],
            ranges: vec![range("quantity", 0.0, 100.0)],
            boolean_columns: names(&["void", "deferred", "tax_exempt"]),
            max_lengths: vec![
                max_len("menu_item", 200),
                max_len("sku", 50),
                max_len("plu", 50),
            ],
            key_columns: names(&["item_selection_id"]),
            ..ValidationRules::default()
        })
        .with_closure_label("menu_item")
}

fn kitchen_timings() -> FileTypeConfig {
    FileTypeConfig::new(FileType::KitchenTimings)
        .with_column("Location", "location", T::String)
        .with_required_column("ID", "id", T::String)
        .with_column("Server", "server", T::String)
        .with_column("Check #", "check_number", T::Integer)
        .with_column("Table", "table", T::String)
        .with_column("Check Opened", "check_opened", T::DateTime)
        .with_column("Station", "station", T::String)
        .with_column("Expediter Level", "expediter_level", T::String)
        .with_column("Fired Date", "fired_date", T::DateTime)
        .with_column("Fulfilled Date", "fulfilled_date", T::DateTime)
        .with_column("Fulfillment Time", "fulfillment_time", T::Float)
        .with_column("Fulfilled By", "fulfilled_by", T::String)
        .with_processing_date()
        .with_special_rule(SpecialRule::DurationToMinutes {
            column: "fulfillment_time".to_string(),
        })
        .with_rules(ValidationRules {
            ranges: vec![range("fulfillment_time", 0.0, 300.0)],
            sequences: vec![names(&["check_opened", "fired_date", "fulfilled_date"])],
            max_lengths: vec![max_len("station", 50), max_len("server", 50)],
            key_columns: names(&["id"]),
            ..ValidationRules::default()
        })
        .with_closure_label("station")
}

fn order_details() -> FileTypeConfig {
    FileTypeConfig::new(FileType::OrderDetails)
        .with_column("Location", "location", T::String)
        .with_required_column("Order Id", "order_id", T::String)
        .with_column("Order #", "order_number", T::String)
        .with_column("Checks", "checks", T::String)
        .with_column("Opened", "opened", T::DateTime)
        .with_column("# of Guests", "guest_count", T::Integer)
        .with_column("Tab Names", "tab_names", T::String)
        .with_column("Server", "server", T::String)
        .with_column("Table", "table", T::String)
        .with_column("Revenue Center", "revenue_center", T::String)
        .with_column("Dining Area", "dining_area", T::String)
        .with_column("Service", "service", T::String)
        .with_column("Dining Options", "dining_options", T::String)
        .with_column("Discount Amount", "discount_amount", T::Float)
        .with_column("Amount", "amount", T::Float)
        .with_column("Tax", "tax", T::Float)
        .with_column("Tip", "tip", T::Float)
        .with_column("Gratuity", "gratuity", T::Float)
        .with_column("Total", "total", T::Float)
        .with_column("Voided", "voided", T::Boolean)
        .with_column("Paid", "paid", T::DateTime)
        .with_column("Closed", "closed", T::DateTime)
        .with_column("Duration (Opened to Paid)", "duration_opened_to_paid", T::Float)
        .with_column("Order Source", "order_source", T::String)
        .with_processing_date()
        .with_special_rule(SpecialRule::DurationToMinutes {
            column: "duration_opened_to_paid".to_string(),
        })
        .with_rules(ValidationRules {
            monetary: vec![
                monetary("amount", 5_000.0),
                monetary("total", 5_000.0),
                monetary("tax", 500.0),
                monetary("tip", 1_000.0),
                monetary("gratuity", 1_000.0),
                monetary("discount_amount", 1_000.0),
            ],
            guest_count_column: Some("guest_count".to_string()),
            boolean_columns: names(&["voided"]),
            sequences: vec![names(&["opened", "paid", "closed"])],
            max_lengths: vec![max_len("server", 50), max_len("order_source", 100)],
            key_columns: names(&["order_id"]),
            ..ValidationRules::default()
        })
        .with_closure_label("location")
}

fn payment_details() -> FileTypeConfig {
    FileTypeConfig::new(FileType::PaymentDetails)
        .with_column("Location", "location", T::String)
        .with_required_column("Payment Id", "payment_id", T::String)
        .with_column("Order Id", "order_id", T::String)
        .with_column("Order #", "order_number", T::String)
        .with_column("Paid Date", "paid_date", T::DateTime)
        .with_column("Order Date", "order_date", T::DateTime)
        .with_column("Check Id", "check_id", T::String)
        .with_column("Check #", "check_number", T::String)
        .with_column("Tab Name", "tab_name", T::String)
        .with_column("Server", "server", T::String)
        .with_column("Table", "table", T::String)
        .with_column("Dining Area", "dining_area", T::String)
        .with_column("Service", "service", T::String)
        .with_column("Dining Option", "dining_option", T::String)
        .with_column("House Acct #", "house_account_number", T::String)
        .with_column("Amount", "amount", T::Float)
        .with_column("Tip", "tip", T::Float)
        .with_column("Gratuity", "gratuity", T::Float)
        .with_column("Total", "total", T::Float)
        .with_column("Swiped Card Amount", "swiped_card_amount", T::Float)
        .with_column("Keyed Card Amount", "keyed_card_amount", T::Float)
        .with_column("Amount Tendered", "amount_tendered", T::Float)
        .with_column("Refunded", "refunded", T::String)
        .with_column("Refund Date", "refund_date", T::DateTime)
        .with_column("Refund Amount", "refund_amount", T::Float)
        .with_column("Refund Tip Amount", "refund_tip_amount", T::Float)
        .with_column("Void User", "void_user", T::String)
        .with_column("Void Approver", "void_approver", T::String)
        .with_column("Void Date", "void_date", T::DateTime)
        .with_column("Status", "status", T::String)
        .with_column("Type", "type", T::String)
        .with_column("Cash Drawer", "cash_drawer", T::String)
        .with_column("Card Type", "card_type", T::String)
        .with_column("Other Type", "other_type", T::String)
        .with_column("Email", "email", T::String)
        .with_column("Phone", "phone", T::String)
        .with_column("Last 4 Card Digits", "last_4_card_digits", T::String)
        .with_column("V/MC/D Fees", "vmcd_fees", T::Float)
        .with_column("Room Info", "room_info", T::String)
        .with_column("Receipt", "receipt", T::String)
        .with_column("Source", "source", T::String)
        .with_column("Last 4 Gift Card Digits", "last_4_gift_card_digits", T::String)
        .with_column("First 5 Gift Card Digits", "first_5_gift_card_digits", T::String)
        .with_processing_date()
        .with_rules(ValidationRules {
            monetary: vec![
                monetary("amount", 5_000.0),
                monetary("total", 5_000.0),
                monetary("tip", 1_000.0),
                monetary("swiped_card_amount", 5_000.0),
                monetary("keyed_card_amount", 5_000.0),
                monetary("vmcd_fees", 100.0),
            ],
            email_columns: names(&["email"]),
            phone_columns: names(&["phone"]),
            card_digits: vec![
                CardDigitsRule {
                    column: "last_4_card_digits".to_string(),
                    length: 4,
                },
                CardDigitsRule {
                    column: "last_4_gift_card_digits".to_string(),
                    length: 4,
                },
                CardDigitsRule {
                    column: "first_5_gift_card_digits".to_string(),
                    length: 5,
                },
            ],
            categories: vec![CategoryRule {
                column: "status".to_string(),
                allowed: names(&["Completed", "Voided", "Refunded", "Pending"]),
            }],
            max_lengths: vec![
                max_len("card_type", 50),
                max_len("email", 200),
                max_len("phone", 20),
            ],
            key_columns: names(&["payment_id"]),
            ..ValidationRules::default()
        })
}

fn referential(
    name: &str,
    parent: FileType,
    parent_key: &str,
    child: FileType,
    child_key: &str,
) -> ReferentialRule {
    ReferentialRule {
        name: name.to_string(),
        parent,
        parent_key: parent_key.to_string(),
        child,
        child_key: child_key.to_string(),
    }
}

impl FileTypeRegistry {
    /// Configuration for all seven standard exports and their relationships
    pub fn standard() -> Self {
        Self::new(
            vec![
                all_items_report(),
                check_details(),
                cash_entries(),
                item_selection_details(),
                kitchen_timings(),
                order_details(),
                payment_details(),
            ],
            vec![
                referential(
                    "order_to_items",
                    FileType::OrderDetails,
                    "order_id",
                    FileType::ItemSelectionDetails,
                    "order_id",
                ),
                referential(
                    "order_to_payments",
                    FileType::OrderDetails,
                    "order_id",
                    FileType::PaymentDetails,
                    "order_id",
                ),
                referential(
                    "check_to_items",
                    FileType::CheckDetails,
                    "check_id",
                    FileType::ItemSelectionDetails,
                    "check_id",
                ),
                referential(
                    "check_to_payments",
                    FileType::CheckDetails,
                    "check_id",
                    FileType::PaymentDetails,
                    "check_id",
                ),
                referential(
                    "check_to_kitchen",
                    FileType::CheckDetails,
                    "check_number",
                    FileType::KitchenTimings,
                    "check_number",
                ),
                referential(
                    "items_to_selections",
                    FileType::AllItemsReport,
                    "item_id",
                    FileType::ItemSelectionDetails,
                    "item_id",
                ),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PROCESSING_DATE_COLUMN;

    #[test]
    fn test_standard_registry_is_valid() {
        let registry = FileTypeRegistry::standard();
        assert_eq!(registry.len(), 7);
        registry.validate().unwrap();
        for ft in FileType::ALL {
            let config = registry.get(ft).unwrap();
            assert!(config.column_spec(PROCESSING_DATE_COLUMN).is_some());
        }
    }

    #[test]
    fn test_identifier_columns_stay_strings() {
        let registry = FileTypeRegistry::standard();
        let items = registry.get(FileType::AllItemsReport).unwrap();
        for id in ["master_id", "item_id", "parent_id"] {
            assert_eq!(items.column_spec(id).unwrap().column_type, T::String);
        }
    }

    #[test]
    fn test_duration_columns_are_special() {
        let registry = FileTypeRegistry::standard();
        let orders = registry.get(FileType::OrderDetails).unwrap();
        assert!(orders.special_rule("duration_opened_to_paid").is_some());
        let kitchen = registry.get(FileType::KitchenTimings).unwrap();
        assert!(kitchen.special_rule("fulfillment_time").is_some());
    }
}
