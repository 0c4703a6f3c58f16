//! Access policies.
//!
//! Every resource class maps to exactly one [`Policy`]. A policy answers two
//! questions: whether the principal may attempt an action on the collection
//! at all ([`Policy::has_permission`]), and whether it may act on one
//! specific instance ([`Policy::has_object_permission`]). Policies are pure:
//! the controller gathers the facts (course membership, instance owner) and
//! passes them in together with the principal.

use crate::error::ApiError;

/// An authenticated user as seen by the policies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i64,
    pub username: String,
    pub is_staff: bool,
    pub is_instructor: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Anonymous,
    User(Identity),
}

impl Principal {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Principal::Anonymous => None,
            Principal::User(id) => Some(id),
        }
    }

    /// The identity, or `Unauthenticated` for anonymous callers.
    pub fn require(&self) -> Result<&Identity, ApiError> {
        self.identity().ok_or(ApiError::Unauthenticated)
    }

    pub fn user_id(&self) -> Option<i64> {
        self.identity().map(|i| i.user_id)
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity().is_some()
    }

    pub fn is_staff(&self) -> bool {
        self.identity().is_some_and(|i| i.is_staff)
    }

    pub fn is_instructor(&self) -> bool {
        self.identity().is_some_and(|i| i.is_instructor)
    }

    /// True when the principal is the user with id `user_id`.
    pub fn is(&self, user_id: i64) -> bool {
        self.user_id() == Some(user_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    List,
    Create,
    Retrieve,
    Update,
    PartialUpdate,
    Destroy,
}

impl Action {
    pub fn is_safe(self) -> bool {
        matches!(self, Action::List | Action::Retrieve)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceClass {
    Instructor,
    Course,
    Enrollment,
    Content,
    Assessment,
    Question,
    AnswerOption,
    Message,
}

/// The principal's relationship to the course a request is scoped under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CourseAccess {
    pub instructor_user_id: i64,
    pub enrolled: bool,
}

impl CourseAccess {
    fn is_instructor(&self, p: &Principal) -> bool {
        p.is(self.instructor_user_id)
    }

    fn is_member(&self, p: &Principal) -> bool {
        self.is_instructor(p) || (p.is_authenticated() && self.enrolled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Instructor profiles: readable by anyone, writable by their owner.
    OwnerOrReadOnly,
    Courses,
    /// Lessons and everything under them.
    CourseContent,
    Messages,
    Enrollments,
}

impl Policy {
    pub const fn for_class(class: ResourceClass) -> Self {
        match class {
            ResourceClass::Instructor => Policy::OwnerOrReadOnly,
            ResourceClass::Course => Policy::Courses,
            ResourceClass::Enrollment => Policy::Enrollments,
            ResourceClass::Content
            | ResourceClass::Assessment
            | ResourceClass::Question
            | ResourceClass::AnswerOption => Policy::CourseContent,
            ResourceClass::Message => Policy::Messages,
        }
    }

    /// Collection-level check, before any instance is known. Course-scoped
    /// policies deny when `course` is missing.
    pub fn has_permission(
        self,
        p: &Principal,
        action: Action,
        course: Option<&CourseAccess>,
    ) -> bool {
        match self {
            Policy::OwnerOrReadOnly => match action {
                Action::List => p.is_staff(),
                a if a.is_safe() => true,
                _ => p.is_authenticated(),
            },
            Policy::Courses => match action {
                // listing is filtered to the caller's own courses instead
                Action::List | Action::Retrieve => true,
                _ => p.is_instructor(),
            },
            Policy::CourseContent => course.is_some_and(|c| content_rule(p, action, c)),
            Policy::Messages => course.is_some_and(|c| c.is_member(p)),
            Policy::Enrollments => match action {
                Action::Create => p.is_authenticated(),
                _ => p.is_staff(),
            },
        }
    }

    /// Instance-level check. `owner` is the user the instance belongs to:
    /// the profile's user, the course's instructor, or the message sender.
    pub fn has_object_permission(
        self,
        p: &Principal,
        action: Action,
        course: Option<&CourseAccess>,
        owner: Option<i64>,
    ) -> bool {
        let owned = owner.is_some_and(|o| p.is(o));
        match self {
            Policy::OwnerOrReadOnly => action.is_safe() || owned,
            Policy::Courses => match action {
                Action::Update | Action::PartialUpdate | Action::Destroy => owned,
                _ => true,
            },
            Policy::CourseContent => course.is_some_and(|c| content_rule(p, action, c)),
            Policy::Messages => owned,
            Policy::Enrollments => p.is_staff(),
        }
    }

    pub fn authorize(
        self,
        p: &Principal,
        action: Action,
        course: Option<&CourseAccess>,
    ) -> Result<(), ApiError> {
        decide(p, self.has_permission(p, action, course))
    }

    pub fn authorize_object(
        self,
        p: &Principal,
        action: Action,
        course: Option<&CourseAccess>,
        owner: Option<i64>,
    ) -> Result<(), ApiError> {
        decide(p, self.has_object_permission(p, action, course, owner))
    }
}

fn content_rule(p: &Principal, action: Action, course: &CourseAccess) -> bool {
    if action.is_safe() {
        course.is_member(p)
    } else {
        course.is_instructor(p)
    }
}

fn decide(p: &Principal, allowed: bool) -> Result<(), ApiError> {
    match (allowed, p.is_authenticated()) {
        (true, _) => Ok(()),
        (false, false) => Err(ApiError::Unauthenticated),
        (false, true) => Err(ApiError::Forbidden),
    }
}
