//! crates/reservation_core/src/permissions.rs
//!
//! Role predicates evaluated against a live `Principal`.
//!
//! Every predicate assumes the token has already been validated and the
//! principal was re-read from the user store on this request; the role claim
//! embedded in the token is never consulted here. Predicates compose with
//! [`Predicate::and`] and [`Predicate::or`].

use crate::admission::ReservationPatch;
use crate::domain::{role_names, Principal, Reservation};
use crate::failure::{Failure, FailureKind};

pub trait Predicate: Send + Sync {
    fn check(&self, principal: &Principal) -> Result<(), Failure>;

    /// Both predicates must allow. The first denial is reported.
    fn and<P>(self, other: P) -> And<Self, P>
    where
        Self: Sized,
        P: Predicate,
    {
        And(self, other)
    }

    /// Either predicate may allow. If both deny, the second denial is reported.
    fn or<P>(self, other: P) -> Or<Self, P>
    where
        Self: Sized,
        P: Predicate,
    {
        Or(self, other)
    }
}

pub struct And<A, B>(A, B);

impl<A: Predicate, B: Predicate> Predicate for And<A, B> {
    fn check(&self, principal: &Principal) -> Result<(), Failure> {
        self.0.check(principal)?;
        self.1.check(principal)
    }
}

pub struct Or<A, B>(A, B);

impl<A: Predicate, B: Predicate> Predicate for Or<A, B> {
    fn check(&self, principal: &Principal) -> Result<(), Failure> {
        match self.0.check(principal) {
            Ok(()) => Ok(()),
            Err(_) => self.1.check(principal),
        }
    }
}

//=========================================================================================
// Role Predicates
//=========================================================================================

/// Allows any principal that made it through token validation.
pub struct Authenticated;

impl Predicate for Authenticated {
    fn check(&self, _principal: &Principal) -> Result<(), Failure> {
        Ok(())
    }
}

/// Allows principals holding one of `roles`.
pub struct RolePredicate {
    roles: &'static [&'static str],
    denial: FailureKind,
    detail: &'static str,
    superuser_bypass: bool,
}

impl Predicate for RolePredicate {
    fn check(&self, principal: &Principal) -> Result<(), Failure> {
        if self.superuser_bypass && principal.is_superuser {
            return Ok(());
        }

        let role = principal.role.as_ref().ok_or_else(Failure::no_role)?;
        if self.roles.iter().any(|name| role.is(name)) {
            Ok(())
        } else {
            Err(Failure::new(self.denial, self.detail))
        }
    }
}

pub fn authenticated() -> Authenticated {
    Authenticated
}

pub fn student() -> RolePredicate {
    RolePredicate {
        roles: &[role_names::STUDENT],
        denial: FailureKind::NotStudent,
        detail: "This endpoint is only accessible to students.",
        superuser_bypass: false,
    }
}

pub fn teacher() -> RolePredicate {
    RolePredicate {
        roles: &[role_names::TEACHER],
        denial: FailureKind::NotTeacher,
        detail: "This endpoint is only accessible to teachers.",
        superuser_bypass: false,
    }
}

pub fn admin() -> RolePredicate {
    RolePredicate {
        roles: &[role_names::ADMIN],
        denial: FailureKind::NotAdmin,
        detail: "This endpoint is only accessible to administrators.",
        superuser_bypass: true,
    }
}

pub fn teacher_or_admin() -> RolePredicate {
    RolePredicate {
        roles: &[role_names::TEACHER, role_names::ADMIN],
        denial: FailureKind::InsufficientPermissions,
        detail: "This endpoint is only accessible to teachers and administrators.",
        superuser_bypass: true,
    }
}

pub fn student_or_teacher() -> RolePredicate {
    RolePredicate {
        roles: &[role_names::STUDENT, role_names::TEACHER],
        denial: FailureKind::InsufficientPermissions,
        detail: "This endpoint is only accessible to students and teachers.",
        superuser_bypass: true,
    }
}

/// Teachers, admins and superusers.
pub fn is_staff(principal: &Principal) -> bool {
    principal.is_superuser
        || principal.has_role(role_names::TEACHER)
        || principal.has_role(role_names::ADMIN)
}

//=========================================================================================
// Field-Level Reservation Access
//=========================================================================================

/// How a principal relates to one reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservationAccess {
    pub is_owner: bool,
    pub is_teacher: bool,
    pub is_admin: bool,
}

impl ReservationAccess {
    pub fn evaluate(principal: &Principal, reservation: &Reservation) -> Self {
        Self {
            is_owner: reservation.user_id == principal.user_id,
            is_teacher: principal.has_role(role_names::TEACHER),
            is_admin: principal.is_superuser || principal.has_role(role_names::ADMIN),
        }
    }

    pub fn is_staff(&self) -> bool {
        self.is_teacher || self.is_admin
    }

    /// Owners may edit the note; only staff may touch the status.
    pub fn authorize(&self, patch: &ReservationPatch) -> Result<(), Failure> {
        if !(self.is_owner || self.is_staff()) {
            return Err(Failure::insufficient_permissions(
                "You don't have permission to update this reservation.",
            ));
        }
        if patch.changes_status() && !self.is_staff() {
            return Err(Failure::insufficient_permissions(
                "Only teachers and admins can change reservation status.",
            ));
        }
        Ok(())
    }
}
