//! Human-readable rendering of a community's role mappings

use crate::types::RoleId;

use super::mapping::MappingTable;

/// Mention markup for a role
pub fn role_mention(role: RoleId) -> String {
    format!("<@&{}>", role)
}

/// Join items as "a, b and c"
pub fn join_with_and(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}

/// One line per listener role listing the target roles that grant it
///
/// Lines follow the order in which each listener first appears in the table.
/// Returns `None` for an empty table.
pub fn render(table: &MappingTable) -> Option<String> {
    if table.is_empty() {
        return None;
    }

    let mut inverse: Vec<(RoleId, Vec<RoleId>)> = Vec::new();
    for (for_role, listener) in table {
        match inverse.iter_mut().find(|(l, _)| l == listener) {
            Some((_, targets)) => targets.push(*for_role),
            None => inverse.push((*listener, vec![*for_role])),
        }
    }

    let lines: Vec<String> = inverse
        .into_iter()
        .map(|(listener, targets)| {
            let mentions: Vec<String> = targets.into_iter().map(role_mention).collect();
            format!(
                "- {} is assigned to {}",
                role_mention(listener),
                join_with_and(&mentions)
            )
        })
        .collect();

    Some(lines.join("\n"))
}
