//! Endpoint table of the payment API.
//!
//! Each `Endpoint` names the method, the path template below the base path
//! and the response the server sends on success. Services start every call
//! from one of these constants.

use crate::client::{ApiCall, ResponseType};
use crate::http::HttpMethod;
use crate::model::FieldType;
use crate::models::{Account, Refund, Subscription, Transaction, WebhookUrl};

#[derive(Debug, Clone, Copy)]
pub struct Endpoint {
    pub method: HttpMethod,
    /// Path template; `{name}` segments are filled by `ApiCall::path_param`.
    pub path: &'static str,
    pub response: fn() -> ResponseType,
}

impl Endpoint {
    /// Start a call to this endpoint.
    pub fn call(&self) -> ApiCall {
        ApiCall::new(self.method, self.path)
            .endpoint(self.path)
            .expect((self.response)())
    }
}

fn typed<T: FieldType>() -> ResponseType {
    ResponseType::of::<T>()
}

fn empty() -> ResponseType {
    ResponseType::Empty
}

fn text() -> ResponseType {
    ResponseType::Text
}

fn file() -> ResponseType {
    ResponseType::File
}

pub const ACCOUNT_READ: Endpoint = Endpoint {
    method: HttpMethod::Get,
    path: "/account/read",
    response: typed::<Account>,
};

pub const TRANSACTION_CREATE: Endpoint = Endpoint {
    method: HttpMethod::Post,
    path: "/transaction/create",
    response: typed::<Transaction>,
};

pub const TRANSACTION_READ: Endpoint = Endpoint {
    method: HttpMethod::Get,
    path: "/transaction/read",
    response: typed::<Transaction>,
};

pub const TRANSACTION_UPDATE: Endpoint = Endpoint {
    method: HttpMethod::Put,
    path: "/transaction/{id}",
    response: typed::<Transaction>,
};

pub const TRANSACTION_COUNT: Endpoint = Endpoint {
    method: HttpMethod::Post,
    path: "/transaction/count",
    response: typed::<i64>,
};

pub const TRANSACTION_SEARCH: Endpoint = Endpoint {
    method: HttpMethod::Post,
    path: "/transaction/search",
    response: typed::<Vec<Transaction>>,
};

pub const TRANSACTION_INVOICE_DOCUMENT: Endpoint = Endpoint {
    method: HttpMethod::Get,
    path: "/transaction/getInvoiceDocument",
    response: file,
};

pub const REFUND_REFUND: Endpoint = Endpoint {
    method: HttpMethod::Post,
    path: "/refund/refund",
    response: typed::<Refund>,
};

pub const REFUND_READ: Endpoint = Endpoint {
    method: HttpMethod::Get,
    path: "/refund/read",
    response: typed::<Refund>,
};

pub const SUBSCRIPTION_CREATE: Endpoint = Endpoint {
    method: HttpMethod::Post,
    path: "/subscription/create",
    response: typed::<Subscription>,
};

pub const SUBSCRIPTION_READ: Endpoint = Endpoint {
    method: HttpMethod::Get,
    path: "/subscription/read",
    response: typed::<Subscription>,
};

pub const SUBSCRIPTION_TERMINATE: Endpoint = Endpoint {
    method: HttpMethod::Post,
    path: "/subscription/terminate",
    response: empty,
};

pub const WEBHOOK_URL_CREATE: Endpoint = Endpoint {
    method: HttpMethod::Post,
    path: "/webhook-url/create",
    response: typed::<WebhookUrl>,
};

pub const WEBHOOK_URL_READ: Endpoint = Endpoint {
    method: HttpMethod::Get,
    path: "/webhook-url/read",
    response: typed::<WebhookUrl>,
};

pub const WEBHOOK_URL_DELETE: Endpoint = Endpoint {
    method: HttpMethod::Delete,
    path: "/webhook-url/{id}",
    response: text,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DeclaredType;

    #[test]
    fn call_carries_method_template_and_response() {
        let call = TRANSACTION_UPDATE.call();
        assert_eq!(call.method, HttpMethod::Put);
        assert_eq!(call.resource_path, "/transaction/{id}");
        assert_eq!(call.endpoint, "/transaction/{id}");
        assert!(matches!(
            call.response_type,
            ResponseType::Value(DeclaredType::Model(_))
        ));
    }

    #[test]
    fn search_expects_a_list() {
        let ResponseType::Value(declared) = TRANSACTION_SEARCH.call().response_type else {
            panic!("search must be typed");
        };
        assert_eq!(declared.to_string(), "array of Transaction");
    }

    #[test]
    fn delete_acknowledges_with_text() {
        assert!(matches!(
            WEBHOOK_URL_DELETE.call().response_type,
            ResponseType::Text
        ));
    }
}
