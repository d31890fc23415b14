use skylab_model::{
    Dimensions, LeaseRequest, PoolPolicy, Selector, SessionId, TagList,
    constants::{DIM_POOL, TAG_LABEL_MODEL, TAG_LEASE_BY, TAG_LEASE_REASON, TAG_LEASE_TOOL,
        TAG_QUOTA_ACCOUNT},
};

use crate::error::CoreResult;

/// Scheduling dimensions for a lease: required pairs first, then any user
/// pair whose key is still free.
pub fn compose_dimensions(
    policy: &PoolPolicy,
    request: &LeaseRequest,
    bot_id: Option<&str>,
) -> CoreResult<Dimensions> {
    let mut dims = request.selector().required_dimensions(policy, bot_id)?;
    dims.merge_absent(request.user_dims());
    Ok(dims)
}

/// Task tags for a lease, deduplicated by key with the first tag winning.
///
/// `model` annotates hostname leases so they count against the model's cap;
/// it is ignored for other selectors.
pub fn compose_tags(
    policy: &PoolPolicy,
    session: &SessionId,
    request: &LeaseRequest,
    model: Option<&str>,
) -> TagList {
    let mut tags = TagList::new();
    tags.push_pair(DIM_POOL, &policy.skylab_pool);
    tags.push(TAG_LEASE_TOOL);
    tags.push_pair(TAG_QUOTA_ACCOUNT, &policy.quota_account);
    tags.push_pair(TAG_LEASE_BY, request.kind().as_str());
    tags.push_pair(TAG_LEASE_REASON, request.reason());
    tags.push(session.tag());

    let selector = request.selector();
    tags.push(selector.selector_tag());
    if let (Selector::Hostname(_), Some(model)) = (selector, model.filter(|m| !m.is_empty())) {
        tags.push_pair(TAG_LABEL_MODEL, model);
    }

    tags.extend(request.user_dims().to_tags());
    tags
}
