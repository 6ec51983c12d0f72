//! Entities of the payment API.
//!
//! Scalar fields are optional; the server fills in what a given endpoint
//! returns. Collections default to empty and go out as `[]` / `{}`.

use chrono::{DateTime, FixedOffset};

crate::model_enum! {
    pub enum CreationEntityState {
        Create => "CREATE",
        Active => "ACTIVE",
        Inactive => "INACTIVE",
        Deleting => "DELETING",
        Deleted => "DELETED",
    }
}

crate::model_enum! {
    pub enum TransactionState {
        Create => "CREATE",
        Pending => "PENDING",
        Confirmed => "CONFIRMED",
        Processing => "PROCESSING",
        Failed => "FAILED",
        Authorized => "AUTHORIZED",
        Voided => "VOIDED",
        Completed => "COMPLETED",
        Fulfill => "FULFILL",
        Decline => "DECLINE",
    }
}

crate::model_enum! {
    pub enum RefundState {
        Create => "CREATE",
        Scheduled => "SCHEDULED",
        Pending => "PENDING",
        ManualCheck => "MANUAL_CHECK",
        Failed => "FAILED",
        Successful => "SUCCESSFUL",
    }
}

crate::model_enum! {
    pub enum RefundType {
        MerchantInitiatedOnline => "MERCHANT_INITIATED_ONLINE",
        MerchantInitiatedOffline => "MERCHANT_INITIATED_OFFLINE",
        CustomerInitiatedAutomatic => "CUSTOMER_INITIATED_AUTOMATIC",
        CustomerInitiatedManual => "CUSTOMER_INITIATED_MANUAL",
    }
}

crate::model_enum! {
    pub enum SubscriptionState {
        Pending => "PENDING",
        Initializing => "INITIALIZING",
        Failed => "FAILED",
        Active => "ACTIVE",
        Suspended => "SUSPENDED",
        Terminating => "TERMINATING",
        Terminated => "TERMINATED",
    }
}

crate::model_enum! {
    pub enum LineItemType {
        Shipping => "SHIPPING",
        Discount => "DISCOUNT",
        Fee => "FEE",
        Product => "PRODUCT",
    }
}

crate::model_enum! {
    /// Node kind of a query filter tree.
    pub enum EntityQueryFilterType {
        Leaf => "LEAF",
        Or => "OR",
        And => "AND",
    }
}

crate::model_enum! {
    pub enum CriteriaOperator {
        Equals => "EQUALS",
        GreaterThan => "GREATER_THAN",
        GreaterThanOrEqual => "GREATER_THAN_OR_EQUAL",
        LessThan => "LESS_THAN",
        LessThanOrEqual => "LESS_THAN_OR_EQUAL",
        Contains => "CONTAINS",
        NotEquals => "NOT_EQUALS",
        NotContains => "NOT_CONTAINS",
        IsNull => "IS_NULL",
        IsNotNull => "IS_NOT_NULL",
    }
}

crate::model_enum! {
    pub enum EntityQueryOrderByType {
        Descending => "DESC",
        Ascending => "ASC",
    }
}

crate::model! {
    pub struct Account {
        pub id: Option<i64> => "id",
        pub version: Option<i32> => "version",
        pub name: Option<String> => "name",
        pub state: Option<CreationEntityState> => "state",
        pub parent_account: Option<Box<Account>> => "parentAccount",
        pub created_on: Option<DateTime<FixedOffset>> => "createdOn",
    }
}

crate::model! {
    pub struct LineItem {
        pub unique_id: Option<String> => "uniqueId",
        pub sku: Option<String> => "sku",
        pub name: Option<String> => "name",
        pub quantity: Option<f64> => "quantity",
        pub amount_including_tax: Option<f64> => "amountIncludingTax",
        pub item_type: Option<LineItemType> => "type",
    }
}

crate::model! {
    pub struct Transaction {
        pub id: Option<i64> => "id",
        pub version: Option<i32> => "version",
        pub linked_space_id: Option<i64> => "linkedSpaceId",
        pub state: Option<TransactionState> => "state",
        pub currency: Option<String> => "currency",
        pub line_items: Vec<LineItem> => "lineItems",
        pub authorization_amount: Option<f64> => "authorizationAmount",
        pub merchant_reference: Option<String> => "merchantReference",
        pub customer_email_address: Option<String> => "customerEmailAddress",
        pub created_on: Option<DateTime<FixedOffset>> => "createdOn",
        pub completed_on: Option<DateTime<FixedOffset>> => "completedOn",
        pub meta_data: std::collections::BTreeMap<String, String> => "metaData",
    }
}

crate::model! {
    pub struct TransactionCreate {
        pub currency: Option<String> => "currency",
        pub line_items: Vec<LineItem> => "lineItems",
        pub merchant_reference: Option<String> => "merchantReference",
        pub customer_email_address: Option<String> => "customerEmailAddress",
        pub success_url: Option<String> => "successUrl",
        pub failed_url: Option<String> => "failedUrl",
        pub auto_confirmation_enabled: Option<bool> => "autoConfirmationEnabled",
        pub meta_data: std::collections::BTreeMap<String, String> => "metaData",
    }
}

crate::model! {
    /// Changes to a transaction that is still pending. `id` and `version`
    /// are required; a stale `version` is rejected with a versioning error.
    pub struct TransactionPending {
        pub id: Option<i64> => "id",
        pub version: Option<i32> => "version",
        pub currency: Option<String> => "currency",
        pub line_items: Vec<LineItem> => "lineItems",
        pub merchant_reference: Option<String> => "merchantReference",
        pub customer_email_address: Option<String> => "customerEmailAddress",
    }
}

crate::model! {
    pub struct Refund {
        pub id: Option<i64> => "id",
        pub version: Option<i32> => "version",
        pub state: Option<RefundState> => "state",
        pub amount: Option<f64> => "amount",
        pub external_id: Option<String> => "externalId",
        pub refund_type: Option<RefundType> => "type",
        pub transaction: Option<Transaction> => "transaction",
        pub created_on: Option<DateTime<FixedOffset>> => "createdOn",
    }
}

crate::model! {
    pub struct RefundCreate {
        pub external_id: Option<String> => "externalId",
        /// Id of the transaction to refund.
        pub transaction: Option<i64> => "transaction",
        pub amount: Option<f64> => "amount",
        pub merchant_reference: Option<String> => "merchantReference",
        pub refund_type: Option<RefundType> => "type",
    }
}

crate::model! {
    pub struct Subscription {
        pub id: Option<i64> => "id",
        pub version: Option<i32> => "version",
        pub state: Option<SubscriptionState> => "state",
        pub reference: Option<String> => "reference",
        pub description: Option<String> => "description",
        pub subscriber: Option<i64> => "subscriber",
        pub planned_termination_date: Option<DateTime<FixedOffset>> => "plannedTerminationDate",
        pub terminated_on: Option<DateTime<FixedOffset>> => "terminatedOn",
        pub created_on: Option<DateTime<FixedOffset>> => "createdOn",
    }
}

crate::model! {
    pub struct SubscriptionCreate {
        pub reference: Option<String> => "reference",
        pub description: Option<String> => "description",
        pub subscriber: Option<i64> => "subscriber",
        pub language: Option<String> => "language",
    }
}

crate::model! {
    pub struct WebhookUrl {
        pub id: Option<i64> => "id",
        pub version: Option<i32> => "version",
        pub name: Option<String> => "name",
        pub url: Option<String> => "url",
        pub state: Option<CreationEntityState> => "state",
    }
}

crate::model! {
    pub struct WebhookUrlCreate {
        pub name: Option<String> => "name",
        pub url: Option<String> => "url",
        pub state: Option<CreationEntityState> => "state",
    }
}

crate::model! {
    /// A node of a query filter tree: a `LEAF` compares one field, `AND` and
    /// `OR` combine `children`.
    pub struct EntityQueryFilter {
        pub filter_type: Option<EntityQueryFilterType> => "type",
        pub field_name: Option<String> => "fieldName",
        pub operator: Option<CriteriaOperator> => "operator",
        pub value: Option<serde_json::Value> => "value",
        pub children: Vec<EntityQueryFilter> => "children",
    }
}

impl EntityQueryFilter {
    pub fn leaf(
        field_name: impl Into<String>,
        operator: CriteriaOperator,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        Self {
            filter_type: Some(EntityQueryFilterType::Leaf),
            field_name: Some(field_name.into()),
            operator: Some(operator),
            value: Some(value.into()),
            children: Vec::new(),
        }
    }

    pub fn and(children: Vec<EntityQueryFilter>) -> Self {
        Self {
            filter_type: Some(EntityQueryFilterType::And),
            children,
            ..Self::default()
        }
    }

    pub fn or(children: Vec<EntityQueryFilter>) -> Self {
        Self {
            filter_type: Some(EntityQueryFilterType::Or),
            children,
            ..Self::default()
        }
    }
}

crate::model! {
    pub struct EntityQueryOrderBy {
        pub field_name: Option<String> => "fieldName",
        pub sorting: Option<EntityQueryOrderByType> => "sorting",
    }
}

crate::model! {
    pub struct EntityQuery {
        pub filter: Option<EntityQueryFilter> => "filter",
        pub order_bys: Vec<EntityQueryOrderBy> => "orderBys",
        pub number_of_entities: Option<i32> => "numberOfEntities",
        pub starting_entity: Option<i32> => "startingEntity",
        pub language: Option<String> => "language",
    }
}
