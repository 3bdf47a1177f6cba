//! Keyword intent matching for order requests phrased in plain Chinese.
//!
//! Used only when the model produced no directive and
//! `assistant.keyword_fallback` is enabled. A match must be complete: a
//! create intent needs every order field, a query or cancel intent needs an
//! order number. Anything less yields no directive.

use regex::Regex;
use shopdesk_core::tool::ToolDirective;

const CREATE_KEYWORDS: [&str; 3] = ["下单", "购买", "买"];
const QUERY_KEYWORDS: [&str; 2] = ["查询订单", "订单状态"];
const CANCEL_KEYWORDS: [&str; 2] = ["取消订单", "退单"];

/// Compiled patterns for the order intents.
#[derive(Debug, Clone)]
pub struct IntentMatcher {
    product: Vec<Regex>,
    quantity: Vec<Regex>,
    name: Vec<Regex>,
    phone: Regex,
    address: Vec<Regex>,
    order_number: Regex,
}

fn compile(patterns: &[&str]) -> Result<Vec<Regex>, regex::Error> {
    patterns.iter().map(|p| Regex::new(p)).collect()
}

/// Capture group 1 of the first pattern that matches.
fn first_capture<'t>(patterns: &[Regex], text: &'t str) -> Option<&'t str> {
    patterns
        .iter()
        .find_map(|re| re.captures(text).and_then(|caps| caps.get(1)))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}

impl IntentMatcher {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            product: compile(&[
                r"(?:商品名称|商品|产品)[=是:：\s]*(\p{Han}[^，,。；;\s]*)",
                r"productName[=:]\s*([^，,。；;\s]+)",
            ])?,
            quantity: compile(&[r"数量[=是:：\s]*(\d+)", r"quantity[=:]\s*(\d+)"])?,
            name: compile(&[
                r"(?:收货人|客户姓名|姓名|客户)[=是:：\s]*(\p{Han}{2,4})",
                r"customerName[=:]\s*(\p{Han}+)",
                r"[，,]\s*(\p{Han}{2,4})[，,]",
            ])?,
            phone: Regex::new(r"(?:^|\D)(1[3-9]\d{9})(?:\D|$)")?,
            address: compile(&[
                r"(?:收货地址|配送地址|地址)[=是:：\s]*([^，,。]+)",
                r"(\p{Han}+[市区县]\p{Han}+[路街道号]\d*号?[\p{Han}\d]*)",
            ])?,
            order_number: Regex::new(r"ORD-\d+")?,
        })
    }

    /// Map a user message to a tool directive, if it states a complete
    /// order intent.
    pub fn match_intent(&self, message: &str) -> Option<ToolDirective> {
        if contains_any(message, &CREATE_KEYWORDS) {
            if let Some(directive) = self.create_order(message) {
                return Some(directive);
            }
        }

        let tool = if contains_any(message, &QUERY_KEYWORDS) {
            "query_order"
        } else if contains_any(message, &CANCEL_KEYWORDS) {
            "cancel_order"
        } else {
            return None;
        };

        let number = self.order_number.find(message)?;
        Some(ToolDirective::new(tool).with_arg("orderNumber", number.as_str()))
    }

    fn create_order(&self, message: &str) -> Option<ToolDirective> {
        let product = first_capture(&self.product, message)?;
        let quantity = first_capture(&self.quantity, message)?
            .parse::<i64>()
            .ok()
            .filter(|q| *q > 0)?;
        let name = first_capture(&self.name, message)?;
        let phone = self.phone.captures(message)?.get(1)?.as_str();
        let address = first_capture(&self.address, message)?;

        Some(
            ToolDirective::new("create_order")
                .with_arg("productName", product)
                .with_arg("quantity", quantity)
                .with_arg("customerName", name)
                .with_arg("customerPhone", phone)
                .with_arg("shippingAddress", address),
        )
    }
}
