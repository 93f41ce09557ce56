use crate::artifact::ContractArtifact;
use crate::error::ChainError;
use crate::rpc::RpcClient;
use ethabi::ethereum_types::U256;
use ethabi::{Address, Contract, Token};

#[derive(Debug, Clone, PartialEq)]
pub struct Classroom {
    pub id: u64,
    pub name: String,
    pub students: Vec<Address>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Student {
    pub address: Address,
    pub name: String,
    pub reg_no: String,
    /// Unix seconds of the last marked attendance; 0 if never marked.
    pub last_attendance: u64,
    pub is_verified: bool,
}

/// Students whose attendance has been marked in a classroom.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkedAttendance {
    pub addresses: Vec<Address>,
    pub reg_nos: Vec<String>,
}

/// One student read of a roster: the address and what came back for it.
pub type RosterEntry = (Address, Result<Student, ChainError>);

/// Read-only view of a deployed attendance contract.
pub struct AttendanceContract {
    rpc: RpcClient,
    address: Address,
    abi: Contract,
}

impl AttendanceContract {
    pub fn new(rpc: RpcClient, address: Address, abi: Contract) -> Self {
        Self { rpc, address, abi }
    }

    /// Use the artifact's ABI; `address` overrides the artifact's deployed address.
    pub fn from_artifact(
        rpc: RpcClient,
        artifact: ContractArtifact,
        address: Option<Address>,
    ) -> Result<Self, ChainError> {
        let address = address.or(artifact.address).ok_or_else(|| {
            ChainError::Artifact("no contract address configured or recorded for this network".into())
        })?;
        Ok(Self::new(rpc, address, artifact.abi))
    }

    pub fn address(&self) -> Address {
        self.address
    }

    async fn call(&self, function: &'static str, args: &[Token]) -> Result<Outputs, ChainError> {
        let f = self.abi.function(function)?;
        let data = f.encode_input(args)?;
        let raw = self.rpc.eth_call(self.address, &data).await?;
        let tokens = f.decode_output(&raw)?;
        tracing::debug!(function, outputs = tokens.len(), "contract call returned");
        Ok(Outputs {
            function,
            tokens: tokens.into_iter(),
        })
    }

    pub async fn classroom_count(&self) -> Result<u64, ChainError> {
        let mut out = self.call("classroomCount", &[]).await?;
        out.uint()
    }

    /// `getClassroom(classId) -> (name, studentAddresses)`
    pub async fn get_classroom(&self, class_id: u64) -> Result<Classroom, ChainError> {
        let mut out = self.call("getClassroom", &[uint(class_id)]).await?;
        Ok(Classroom {
            id: class_id,
            name: out.string()?,
            students: out.addresses()?,
        })
    }

    /// `getStudent(classId, student) -> (name, regNo, lastAttendance, isVerified)`
    pub async fn get_student(&self, class_id: u64, student: Address) -> Result<Student, ChainError> {
        let mut out = self
            .call("getStudent", &[uint(class_id), Token::Address(student)])
            .await?;
        Ok(Student {
            address: student,
            name: out.string()?,
            reg_no: out.string()?,
            last_attendance: out.uint()?,
            is_verified: out.bool()?,
        })
    }

    pub async fn marked_attendance(&self, class_id: u64) -> Result<MarkedAttendance, ChainError> {
        let mut out = self
            .call("getMarkedAttendanceStudents", &[uint(class_id)])
            .await?;
        Ok(MarkedAttendance {
            addresses: out.addresses()?,
            reg_nos: out.strings()?,
        })
    }

    /// The zero address means no student has that registration number.
    pub async fn student_address_by_reg_no(&self, reg_no: &str) -> Result<Option<Address>, ChainError> {
        let mut out = self
            .call("getStudentAddressByRegNo", &[Token::String(reg_no.to_string())])
            .await?;
        let address = out.address()?;
        Ok((!address.is_zero()).then_some(address))
    }

    /// Read a classroom, then each of its students in turn.
    ///
    /// A failed student read is kept in the roster and does not stop the
    /// remaining reads; a failed classroom read fails the whole roster.
    pub async fn roster(&self, class_id: u64) -> Result<(Classroom, Vec<RosterEntry>), ChainError> {
        let classroom = self.get_classroom(class_id).await?;
        tracing::info!(
            class_id,
            name = %classroom.name,
            students = classroom.students.len(),
            "classroom loaded"
        );

        let mut entries = Vec::with_capacity(classroom.students.len());
        for &address in &classroom.students {
            let student = self.get_student(class_id, address).await;
            if let Err(e) = &student {
                tracing::warn!(class_id, address = ?address, error = %e, "student read failed");
            }
            entries.push((address, student));
        }
        Ok((classroom, entries))
    }
}

fn uint(value: u64) -> Token {
    Token::Uint(U256::from(value))
}

/// Decoded return values, consumed in declaration order.
struct Outputs {
    function: &'static str,
    tokens: std::vec::IntoIter<Token>,
}

impl Outputs {
    fn next(&mut self, expected: &str) -> Result<Token, ChainError> {
        self.tokens.next().ok_or_else(|| self.unexpected(format!("missing {expected}")))
    }

    fn unexpected(&self, detail: String) -> ChainError {
        ChainError::UnexpectedOutput {
            function: self.function,
            detail,
        }
    }

    fn string(&mut self) -> Result<String, ChainError> {
        let token = self.next("string")?;
        token
            .clone()
            .into_string()
            .ok_or_else(|| self.unexpected(format!("expected string, got {token:?}")))
    }

    fn uint(&mut self) -> Result<u64, ChainError> {
        let token = self.next("uint256")?;
        let value = token
            .clone()
            .into_uint()
            .ok_or_else(|| self.unexpected(format!("expected uint256, got {token:?}")))?;
        if value > U256::from(u64::MAX) {
            return Err(self.unexpected(format!("uint256 {value} does not fit in u64")));
        }
        Ok(value.low_u64())
    }

    fn bool(&mut self) -> Result<bool, ChainError> {
        let token = self.next("bool")?;
        token
            .clone()
            .into_bool()
            .ok_or_else(|| self.unexpected(format!("expected bool, got {token:?}")))
    }

    fn address(&mut self) -> Result<Address, ChainError> {
        let token = self.next("address")?;
        token
            .clone()
            .into_address()
            .ok_or_else(|| self.unexpected(format!("expected address, got {token:?}")))
    }

    fn array(&mut self, expected: &str) -> Result<Vec<Token>, ChainError> {
        let token = self.next(expected)?;
        token
            .clone()
            .into_array()
            .ok_or_else(|| self.unexpected(format!("expected {expected}, got {token:?}")))
    }

    fn addresses(&mut self) -> Result<Vec<Address>, ChainError> {
        self.array("address[]")?
            .into_iter()
            .map(|t| t.into_address().ok_or_else(|| self.unexpected("non-address in address[]".into())))
            .collect()
    }

    fn strings(&mut self) -> Result<Vec<String>, ChainError> {
        self.array("string[]")?
            .into_iter()
            .map(|t| t.into_string().ok_or_else(|| self.unexpected("non-string in string[]".into())))
            .collect()
    }
}
