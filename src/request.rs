use crate::error::{Result, VastError};
use crate::models::AdRequestParams;
use log::debug;
use url::form_urlencoded;

fn flag(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

/// Build the ad-request URL for `params`.
///
/// Query parameters are always emitted in the same order, so equal inputs
/// produce byte-identical URLs. String values use form encoding
/// (`application/x-www-form-urlencoded`), so a space is written as `+` rather
/// than `%20`; numbers and flags are written as decimal text. Fails only when
/// the base URL is empty.
pub fn build_ad_request_url(params: &AdRequestParams) -> Result<String> {
    let base = params.base_url.trim();
    if base.is_empty() {
        return Err(VastError::MissingField("baseURL".to_string()));
    }

    let device = &params.device;
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("placementId", &params.placement_id)
        .append_pair("c", params.ad_type.content_code())
        .append_pair("m", "api")
        .append_pair("res", "js")
        .append_pair("app", "1")
        .append_pair("bundle", &device.bundle_id)
        .append_pair("name", &device.app_name)
        .append_pair("app_store_url", &device.app_store_url)
        .append_pair("language", &device.language)
        .append_pair("deviceWidth", &device.screen_width.to_string())
        .append_pair("deviceHeight", &device.screen_height.to_string())
        .append_pair("ua", &device.user_agent)
        .append_pair("ifa", &device.advertising_id)
        .append_pair("dnt", flag(device.do_not_track))
        .append_pair("gdpr", flag(device.gdpr))
        .append_pair("gdpr_consent", &device.gdpr_consent)
        .append_pair("us_privacy", &device.us_privacy)
        .append_pair("ccpa", flag(device.ccpa))
        .append_pair("coppa", flag(device.coppa))
        .finish();

    let separator = match base.find('?') {
        None => "?",
        Some(_) if base.ends_with('?') || base.ends_with('&') => "",
        Some(_) => "&",
    };
    let url = format!("{}{}{}", base, separator, query);

    if params.debug {
        debug!(
            "Ad request for placement {} ({}, {:?}): {}",
            params.placement_id, params.ad_type, params.position, url
        );
    }
    Ok(url)
}
