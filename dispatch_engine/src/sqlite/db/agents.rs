use log::{debug, trace, warn};
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{AgentProfile, AgentStatus},
    traits::DispatchError,
};

pub async fn fetch_agent(id: i64, conn: &mut SqliteConnection) -> Result<Option<AgentProfile>, sqlx::Error> {
    let agent = sqlx::query_as("SELECT * FROM agents WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(agent)
}

/// The hard eligibility filters of the candidate repository: KYC verified, active account, currently `Available`,
/// accepting orders, and not on the exclusion list (agents that already rejected the order).
pub async fn eligible_agents(
    exclude: &[i64],
    conn: &mut SqliteConnection,
) -> Result<Vec<AgentProfile>, sqlx::Error> {
    let mut builder = QueryBuilder::new(
        "SELECT * FROM agents WHERE is_kyc_verified = 1 AND is_deactivated = 0 AND current_status = 'Available' AND \
         is_accepting_orders = 1",
    );
    if !exclude.is_empty() {
        builder.push(" AND id NOT IN (");
        let mut ids = builder.separated(", ");
        for id in exclude {
            ids.push_bind(*id);
        }
        builder.push(")");
    }
    trace!("🧭️ Executing candidate query: {}", builder.sql());
    let agents = builder.build_query_as::<AgentProfile>().fetch_all(conn).await?;
    Ok(agents)
}

/// Presence updates requested by the agent themselves (or an admin). Going `Available` requires a verified KYC.
/// `kyc_complete` is healed to match `is_kyc_verified` whenever the two disagree.
pub async fn update_presence(
    agent_id: i64,
    status: AgentStatus,
    is_accepting_orders: bool,
    conn: &mut SqliteConnection,
) -> Result<AgentProfile, DispatchError> {
    let agent = fetch_agent(agent_id, &mut *conn).await?.ok_or(DispatchError::AgentNotFound(agent_id))?;
    if status == AgentStatus::Available && !agent.is_kyc_verified {
        return Err(DispatchError::KycNotVerified(agent_id));
    }
    if agent.metadata.kyc_complete != agent.is_kyc_verified {
        warn!(
            "🧭️ Agent {agent_id} has kyc_complete = {} but is_kyc_verified = {}. Healing the metadata flag.",
            agent.metadata.kyc_complete, agent.is_kyc_verified
        );
    }
    let updated: Option<AgentProfile> = sqlx::query_as(
        "UPDATE agents SET current_status = $1, is_accepting_orders = $2, kyc_complete = is_kyc_verified, \
         last_status_update = CURRENT_TIMESTAMP WHERE id = $3 RETURNING *",
    )
    .bind(status)
    .bind(is_accepting_orders)
    .bind(agent_id)
    .fetch_optional(conn)
    .await?;
    debug!("🧭️ Agent {agent_id} presence set to {status} (accepting: {is_accepting_orders})");
    updated.ok_or(DispatchError::AgentNotFound(agent_id))
}

/// Engine-internal availability flip used by assignment, release, and the lifecycle side effects. No KYC gate:
/// the agent passed it to become assignable in the first place.
pub(crate) async fn set_availability(
    agent_id: i64,
    status: AgentStatus,
    is_accepting_orders: bool,
    conn: &mut SqliteConnection,
) -> Result<AgentProfile, DispatchError> {
    let updated: Option<AgentProfile> = sqlx::query_as(
        "UPDATE agents SET current_status = $1, is_accepting_orders = $2, last_status_update = CURRENT_TIMESTAMP \
         WHERE id = $3 RETURNING *",
    )
    .bind(status)
    .bind(is_accepting_orders)
    .bind(agent_id)
    .fetch_optional(conn)
    .await?;
    updated.ok_or(DispatchError::AgentNotFound(agent_id))
}
