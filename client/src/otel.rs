use reqwest::header::{HeaderName, HeaderValue};
use reqwest::Request;
use std::str::FromStr;
use tracing::Span;

/// Injects the current span's OpenTelemetry context into the request headers so
/// backend queries show up under the harness trace.
pub fn inject_opentelemetry_context_into_request(request: &mut Request) {
    opentelemetry::global::get_text_map_propagator(|injector| {
        use tracing_opentelemetry::OpenTelemetrySpanExt;
        let context = Span::current().context();
        injector.inject_context(&context, &mut RequestCarrier::new(request))
    });
}

// "traceparent" => https://www.w3.org/TR/trace-context/#trace-context-http-headers-format

/// Lets the propagator write `traceparent` (and friends) into a reqwest request.
/// Keys or values that are not valid header text are dropped.
struct RequestCarrier<'a> {
    request: &'a mut Request,
}

impl<'a> RequestCarrier<'a> {
    fn new(request: &'a mut Request) -> Self {
        RequestCarrier { request }
    }

    fn set_inner(&mut self, key: &str, value: String) {
        let (Ok(header_name), Ok(header_value)) =
            (HeaderName::from_str(key), HeaderValue::from_str(&value))
        else {
            tracing::debug!(key, "skipping propagation header that is not valid HTTP");
            return;
        };
        self.request.headers_mut().insert(header_name, header_value);
    }
}

impl opentelemetry::propagation::Injector for RequestCarrier<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.set_inner(key, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::propagation::Injector;

    #[test]
    fn carrier_sets_valid_headers_and_skips_invalid_ones() {
        let mut request = Request::new(
            reqwest::Method::POST,
            "http://localhost/v2/entries:list".parse().unwrap(),
        );
        {
            let mut carrier = RequestCarrier::new(&mut request);
            carrier.set("traceparent", "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01".into());
            carrier.set("bad header", "x".into());
        }
        assert!(request.headers().contains_key("traceparent"));
        assert_eq!(request.headers().len(), 1);
    }
}
