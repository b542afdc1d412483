use skycast_core::AgentDescriptor;

/// Lowest-priced agent. Ties keep discovery order.
pub fn cheapest(agents: &[AgentDescriptor]) -> Option<&AgentDescriptor> {
    agents
        .iter()
        .reduce(|best, a| if a.price.total_cmp(&best.price).is_lt() { a } else { best })
}

/// Look an agent up by exact address or case-insensitive name.
pub fn find_agent<'a>(agents: &'a [AgentDescriptor], key: &str) -> Option<&'a AgentDescriptor> {
    agents
        .iter()
        .find(|a| a.address.as_str() == key)
        .or_else(|| agents.iter().find(|a| a.name.eq_ignore_ascii_case(key)))
}
