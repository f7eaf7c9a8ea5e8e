use crate::models::{ActivitySuggestion, User, UserGroup, Visit, VisitStatus};

/// Partitions `items` by key. Groups come out in first-seen order and members
/// keep their insertion order. An item may land in several groups.
pub fn group_by<'a, T, K, I>(items: &'a [T], keys: impl Fn(&'a T) -> I) -> Vec<(K, Vec<&'a T>)>
where
    K: PartialEq,
    I: IntoIterator<Item = K>,
{
    let mut groups: Vec<(K, Vec<&'a T>)> = Vec::new();
    for item in items {
        for key in keys(item) {
            match groups.iter_mut().find(|(existing, _)| *existing == key) {
                Some((_, members)) => members.push(item),
                None => groups.push((key, vec![item])),
            }
        }
    }
    groups
}

pub fn group_by_city(users: &[User]) -> Vec<(&str, Vec<&User>)> {
    group_by(users, |user| user.city.as_deref())
}

pub fn group_by_organization(users: &[User]) -> Vec<(&str, Vec<&User>)> {
    group_by(users, |user| user.organizations.iter().map(String::as_str))
}

pub fn to_user_groups(groups: Vec<(&str, Vec<&User>)>) -> Vec<UserGroup> {
    groups
        .into_iter()
        .map(|(key, users)| UserGroup {
            key: key.to_string(),
            users: users.into_iter().cloned().collect(),
        })
        .collect()
}

pub fn visits_for_user<'a>(visits: &'a [Visit], user_id: &str) -> Vec<&'a Visit> {
    visits.iter().filter(|visit| visit.user_id == user_id).collect()
}

pub fn current_visit_for_user<'a>(visits: &'a [Visit], user_id: &str) -> Option<&'a Visit> {
    visits
        .iter()
        .find(|visit| visit.user_id == user_id && visit.status == VisitStatus::Current)
}

/// Visits that can still receive activity suggestions.
pub fn active_visits(visits: &[Visit]) -> Vec<&Visit> {
    visits.iter().filter(|visit| visit.status.is_active()).collect()
}

pub fn suggestions_for_visit<'a>(
    suggestions: &'a [ActivitySuggestion],
    visit_id: &str,
) -> Vec<&'a ActivitySuggestion> {
    suggestions
        .iter()
        .filter(|suggestion| suggestion.visit_id == visit_id)
        .collect()
}

pub fn display_name<'a>(users: &'a [User], user_id: &str) -> Option<&'a str> {
    users
        .iter()
        .find(|user| user.id == user_id)
        .map(|user| user.name.as_str())
}

pub fn initials(name: &str) -> String {
    name.split_whitespace()
        .filter_map(|word| word.chars().next())
        .flat_map(char::to_uppercase)
        .take(2)
        .collect()
}
