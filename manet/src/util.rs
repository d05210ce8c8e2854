use crate::framework::NodeId;

/// Metric sentinel for a destination that cannot be reached
pub const NOT_REACHABLE: i32 = -1;

pub fn is_reachable(metric: i32) -> bool {
    metric >= 0
}

/// The metric seen one hop further away, NotReachable stays NotReachable
pub fn hop_further(metric: i32) -> i32 {
    if is_reachable(metric) {
        metric + 1
    } else {
        NOT_REACHABLE
    }
}

/// Whether `candidate` is a strictly shorter path than `current`, NotReachable counts as infinity
///
/// # Examples
///
/// ```
/// use manet::util::{is_shorter, NOT_REACHABLE};
/// assert!(is_shorter(2, 3));
/// assert!(is_shorter(5, NOT_REACHABLE));
/// assert!(!is_shorter(NOT_REACHABLE, 3));
/// assert!(!is_shorter(NOT_REACHABLE, NOT_REACHABLE));
/// ```
pub fn is_shorter(candidate: i32, current: i32) -> bool {
    match (is_reachable(candidate), is_reachable(current)) {
        (true, true) => candidate < current,
        (true, false) => true,
        _ => false,
    }
}

/// Element right after `current` in a source route.
/// An empty route, an absent `current` or a `current` at the end all yield `None`.
///
/// # Examples
///
/// ```
/// let route: Vec<String> = ["a", "b", "c"].iter().map(|x| x.to_string()).collect();
/// assert_eq!(manet::util::next_in_route(&route, "a").map(String::as_str), Some("b"));
/// assert_eq!(manet::util::next_in_route(&route, "c"), None);
/// assert_eq!(manet::util::next_in_route(&route, "z"), None);
/// ```
pub fn next_in_route<'r>(route: &'r [NodeId], current: &str) -> Option<&'r NodeId> {
    let index = route.iter().position(|hop| hop == current)?;
    route.get(index + 1)
}

/// Element right before `current` in a source route, `None` when `current` is first or absent
///
/// # Examples
///
/// ```
/// let route: Vec<String> = ["a", "b", "c"].iter().map(|x| x.to_string()).collect();
/// assert_eq!(manet::util::previous_in_route(&route, "c").map(String::as_str), Some("b"));
/// assert_eq!(manet::util::previous_in_route(&route, "a"), None);
/// assert_eq!(manet::util::previous_in_route(&route, "z"), None);
/// ```
pub fn previous_in_route<'r>(route: &'r [NodeId], current: &str) -> Option<&'r NodeId> {
    let index = route.iter().position(|hop| hop == current)?;
    index.checked_sub(1).and_then(|prev| route.get(prev))
}
