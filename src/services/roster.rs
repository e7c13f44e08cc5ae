use tracing::warn;

use crate::{
    dao::models::{Competition, Resource, Team, Variant},
    error::ServiceError,
    services::sync_service,
    state::SharedState,
};

const PLACEHOLDER_PREFIX: &str = "TEAM-";

/// Whether `name` is an auto-generated or missing team name (`TEAM-42`, blank).
pub fn is_placeholder_name(name: &str) -> bool {
    let name = name.trim();
    if name.is_empty() {
        return true;
    }
    name.get(..PLACEHOLDER_PREFIX.len())
        .filter(|prefix| prefix.eq_ignore_ascii_case(PLACEHOLDER_PREFIX))
        .map(|_| &name[PLACEHOLDER_PREFIX.len()..])
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

/// Resolve a competition reference (slug or display name) to its slug.
///
/// Unknown references resolve to themselves.
pub fn resolve_competition<'a>(competitions: &'a [Competition], reference: &'a str) -> &'a str {
    let reference = reference.trim();
    competitions
        .iter()
        .find(|competition| {
            competition.slug.eq_ignore_ascii_case(reference)
                || competition.name.trim().eq_ignore_ascii_case(reference)
        })
        .map(|competition| competition.slug.as_str())
        .unwrap_or(reference)
}

/// Teams registered for `competition`, placeholder names excluded.
pub fn filter_teams_by_competition(
    teams: &[Team],
    competitions: &[Competition],
    competition: &str,
) -> Vec<Team> {
    let wanted = resolve_competition(competitions, competition);
    teams
        .iter()
        .filter(|team| !is_placeholder_name(&team.name))
        .filter(|team| {
            team.competition
                .as_deref()
                .is_some_and(|entered| resolve_competition(competitions, entered).eq_ignore_ascii_case(wanted))
        })
        .cloned()
        .collect()
}

/// Teams for the HTTP surface, stale-while-revalidate.
///
/// Without `force` the cached list (possibly empty) is returned at once and a
/// background refetch is scheduled when the entry is stale.
pub async fn list_teams(
    state: &SharedState,
    variant: Variant,
    competition: Option<&str>,
    force: bool,
) -> Result<Vec<Team>, ServiceError> {
    let teams = if force {
        state.fetchers().fetch_teams(variant, true).await?
    } else {
        sync_service::revalidate_in_background(state, Resource::Teams, variant);
        state.fetchers().cached_teams(variant).unwrap_or_default()
    };

    let Some(competition) = competition.filter(|value| !value.trim().is_empty()) else {
        return Ok(teams);
    };

    let competitions = match state.fetchers().fetch_competitions(Variant::Minimal, false).await {
        Ok(competitions) => competitions,
        Err(err) => {
            warn!(error = %err, "competitions unavailable; filtering by raw reference");
            Vec::new()
        }
    };
    Ok(filter_teams_by_competition(&teams, &competitions, competition))
}

/// Competitions for the HTTP surface, stale-while-revalidate.
pub async fn list_competitions(
    state: &SharedState,
    variant: Variant,
    force: bool,
) -> Result<Vec<Competition>, ServiceError> {
    if force {
        return Ok(state.fetchers().fetch_competitions(variant, true).await?);
    }
    sync_service::revalidate_in_background(state, Resource::Competitions, variant);
    Ok(state.fetchers().cached_competitions(variant).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn team(id: i64, name: &str, competition: Option<&str>) -> Team {
        Team {
            id,
            name: name.into(),
            club: None,
            competition: competition.map(Into::into),
            members: Vec::new(),
        }
    }

    fn line_follower() -> Competition {
        Competition {
            id: 1,
            slug: "line_follower".into(),
            name: "Line Follower".into(),
            description: None,
        }
    }

    #[test]
    fn placeholder_names() {
        assert!(is_placeholder_name("TEAM-42"));
        assert!(is_placeholder_name("team-7"));
        assert!(is_placeholder_name("   "));
        assert!(!is_placeholder_name("TEAM-"));
        assert!(!is_placeholder_name("TEAM-4b"));
        assert!(!is_placeholder_name("Team Rocket"));
        assert!(!is_placeholder_name("Équipe-1"));
    }

    #[test]
    fn competitions_resolve_by_slug_or_name() {
        let competitions = [line_follower()];
        assert_eq!(resolve_competition(&competitions, "line_follower"), "line_follower");
        assert_eq!(resolve_competition(&competitions, "line follower"), "line_follower");
        assert_eq!(resolve_competition(&competitions, "sumo"), "sumo");
        assert_eq!(resolve_competition(&[], "line_follower"), "line_follower");
    }

    #[test]
    fn filter_drops_placeholders_and_other_competitions() {
        let teams = [
            team(1, "TEAM-42", Some("line_follower")),
            team(2, "Alpha", Some("line_follower")),
            team(3, "Bravo", Some("sumo")),
            team(4, "Charlie", None),
            team(5, "Delta", Some("Line Follower")),
        ];
        let ids: Vec<i64> = filter_teams_by_competition(&teams, &[line_follower()], "line_follower")
            .into_iter()
            .map(|team| team.id)
            .collect();
        assert_eq!(ids, vec![2, 5]);
    }

    #[test]
    fn unknown_competition_matches_raw_reference() {
        let teams = [team(1, "Alpha", Some("sumo")), team(2, "Bravo", Some("mini_sumo"))];
        let kept = filter_teams_by_competition(&teams, &[], "sumo");
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, 1);
    }
}
